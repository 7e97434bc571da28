//! MCP client: runs the protocol handshake and the typed tool, resource and
//! prompt operations against a single server.

use {
    serde::de::DeserializeOwned,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Context, Error, Result},
    factory::create_transport,
    transport::Transport,
    types::{
        ClientCapabilities, ClientInfo, GetPromptParams, GetPromptResult, InitializeParams,
        InitializeResult, McpPromptDef, McpResourceDef, McpToolDef, PROTOCOL_VERSION,
        PromptsListResult, ReadResourceParams, ReadResourceResult, ResourcesListResult,
        ServerCapabilities, ServerInfo, ToolsCallParams, ToolsCallResult, ToolsListResult,
    },
};

/// State of an MCP client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpClientState {
    /// Transport built, handshake not yet run.
    New,
    /// `initialize` sent, waiting for the server.
    Initializing,
    /// `initialize` completed, `initialized` notification sent.
    Ready,
    /// Transport closed; the client cannot be reused.
    Closed,
}

/// An MCP client bound to one transport.
pub struct McpClient {
    transport: Transport,
    state: McpClientState,
    client_info: ClientInfo,
    init: Option<InitializeResult>,
}

impl McpClient {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            state: McpClientState::New,
            client_info: ClientInfo::default(),
            init: None,
        }
    }

    #[must_use]
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_info = ClientInfo {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    /// Resolve `config`, connect the transport it names and run the handshake.
    pub async fn connect(config: &Value) -> Result<Self> {
        let transport = create_transport(config)?;
        info!(transport = transport.kind(), "connecting to MCP server");
        transport.connect().await?;

        let mut client = Self::new(transport);
        if let Err(e) = client.initialize().await {
            warn!(error = %e, "MCP initialize handshake failed");
            client.close().await;
            return Err(e);
        }
        Ok(client)
    }

    /// Send `initialize`, record what the server reports, then send the
    /// `initialized` notification. A second call returns the stored result.
    pub async fn initialize(&mut self) -> Result<&InitializeResult> {
        match self.state {
            McpClientState::Ready => {
                return self
                    .init
                    .as_ref()
                    .context("MCP client is ready without an initialize result");
            },
            McpClientState::Closed | McpClientState::Initializing => {
                return Err(Error::NotInitialized { state: self.state });
            },
            McpClientState::New => {},
        }

        self.state = McpClientState::Initializing;
        match self.handshake().await {
            Ok(result) => {
                info!(
                    protocol = %result.protocol_version,
                    server_name = %result.server_info.name,
                    server_version = ?result.server_info.version,
                    "MCP server initialized"
                );
                self.state = McpClientState::Ready;
                let stored = &*self.init.insert(result);
                Ok(stored)
            },
            Err(e) => {
                self.state = McpClientState::New;
                Err(e)
            },
        }
    }

    async fn handshake(&self) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ClientCapabilities::default(),
            client_info: self.client_info.clone(),
        };

        let resp = self
            .transport
            .request("initialize", Some(serde_json::to_value(&params)?))
            .await?;
        let result: InitializeResult =
            serde_json::from_value(resp).context("failed to parse MCP initialize result")?;

        self.transport
            .notify("notifications/initialized", None)
            .await?;
        Ok(result)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state != McpClientState::Ready {
            return Err(Error::NotInitialized { state: self.state });
        }
        Ok(())
    }

    /// Run a `*/list` request. Servers without the method yield `T::default()`.
    async fn list<T>(&self, method: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        self.ensure_ready()?;
        match self.transport.request(method, None).await {
            Ok(Value::Null) => Ok(T::default()),
            Ok(value) => serde_json::from_value(value)
                .with_context(|| format!("failed to parse '{method}' result")),
            Err(e) if e.is_method_not_found() => {
                debug!(method = %method, "server does not implement list method");
                Ok(T::default())
            },
            Err(e) => Err(e),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        let result: ToolsListResult = self.list("tools/list").await?;
        debug!(count = result.tools.len(), "fetched MCP tools");
        Ok(result.tools)
    }

    pub async fn list_resources(&self) -> Result<Vec<McpResourceDef>> {
        let result: ResourcesListResult = self.list("resources/list").await?;
        Ok(result.resources)
    }

    pub async fn list_prompts(&self) -> Result<Vec<McpPromptDef>> {
        let result: PromptsListResult = self.list("prompts/list").await?;
        Ok(result.prompts)
    }

    /// Call a tool. An unknown tool fails with [`Error::ToolNotFound`] listing
    /// what the server does offer.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        self.ensure_ready()?;

        let params = ToolsCallParams {
            name: name.into(),
            arguments,
        };
        let outcome = self
            .transport
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await
            .and_then(|value| {
                serde_json::from_value::<ToolsCallResult>(value)
                    .context("failed to parse tools/call result")
            });

        match outcome {
            Ok(result) => Ok(result),
            Err(e) if e.is_method_not_found() => {
                let available = match self.list_tools().await {
                    Ok(tools) => tools.into_iter().map(|t| t.name).collect(),
                    Err(list_err) => {
                        warn!(error = %list_err, "failed to list tools for diagnostics");
                        Vec::new()
                    },
                };
                Err(Error::ToolNotFound {
                    requested: name.into(),
                    available,
                })
            },
            Err(e) => Err(Error::ToolCallFailed {
                name: name.into(),
                source: Box::new(e),
            }),
        }
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.ensure_ready()?;
        let params = ReadResourceParams { uri: uri.into() };
        let resp = self
            .transport
            .request("resources/read", Some(serde_json::to_value(&params)?))
            .await?;
        serde_json::from_value(resp).context("failed to parse resources/read result")
    }

    pub async fn get_prompt(&self, name: &str, arguments: Value) -> Result<GetPromptResult> {
        self.ensure_ready()?;
        let params = GetPromptParams {
            name: name.into(),
            arguments,
        };
        let resp = self
            .transport
            .request("prompts/get", Some(serde_json::to_value(&params)?))
            .await?;
        serde_json::from_value(resp).context("failed to parse prompts/get result")
    }

    pub fn state(&self) -> McpClientState {
        self.state
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn initialize_result(&self) -> Option<&InitializeResult> {
        self.init.as_ref()
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.init.as_ref().map(|r| &r.server_info)
    }

    pub fn capabilities(&self) -> Option<&ServerCapabilities> {
        self.init.as_ref().map(|r| &r.capabilities)
    }

    pub fn protocol_version(&self) -> Option<&str> {
        self.init.as_ref().map(|r| r.protocol_version.as_str())
    }

    /// Close the transport. Later operations fail with `NotInitialized`.
    pub async fn close(&mut self) {
        if self.state == McpClientState::Closed {
            return;
        }
        self.state = McpClientState::Closed;
        self.transport.close().await;
    }
}
