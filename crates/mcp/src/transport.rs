//! The transport seam: one closed set of ways to reach an MCP server.

use std::time::Duration;

use {serde_json::Value, tracing::debug};

use crate::{
    error::{Error, Result},
    http_transport::HttpTransport,
    message::{MessageFactory, OutgoingMessage, create_notification},
    stdio_transport::StdioTransport,
    types::JsonRpcRequest,
};

/// Applied to a request when neither the caller nor the config names one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A connection to one MCP server.
pub enum Transport {
    Stdio(StdioTransport),
    Http(HttpTransport),
}

impl Transport {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "stdio",
            Self::Http(_) => "http",
        }
    }

    /// Spawn the process (stdio). HTTP needs no setup.
    pub async fn connect(&self) -> Result<()> {
        match self {
            Self::Stdio(t) => t.connect().await,
            Self::Http(_) => Ok(()),
        }
    }

    pub async fn close(&self) {
        debug!(transport = self.kind(), "closing MCP transport");
        match self {
            Self::Stdio(t) => t.close().await,
            Self::Http(t) => t.close().await,
        }
    }

    pub async fn is_connected(&self) -> bool {
        match self {
            Self::Stdio(t) => t.is_connected().await,
            Self::Http(_) => true,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        match self {
            Self::Stdio(t) => t.request_timeout(),
            Self::Http(t) => t.request_timeout(),
        }
    }

    fn messages(&self) -> &MessageFactory {
        match self {
            Self::Stdio(t) => t.messages(),
            Self::Http(t) => t.messages(),
        }
    }

    /// Build a request using this transport's id counter.
    pub fn create_request(&self, method: &str, params: Option<Value>) -> JsonRpcRequest {
        self.messages().create_request(method, params)
    }

    /// Send a request or notification. Requests yield `Some(result)`,
    /// notifications yield `None`.
    pub async fn send(&self, message: OutgoingMessage) -> Result<Option<Value>> {
        self.send_with_timeout(message, self.request_timeout()).await
    }

    pub async fn send_with_timeout(
        &self,
        message: OutgoingMessage,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        match self {
            Self::Stdio(t) => t.send_with_timeout(message, timeout).await,
            Self::Http(t) => t.send_with_timeout(message, timeout).await,
        }
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request_with_timeout(method, params, self.request_timeout())
            .await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let req = self.create_request(method, params);
        self.send_with_timeout(req.into(), timeout)
            .await?
            .ok_or_else(|| Error::message(format!("no response for request '{method}'")))
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.send(create_notification(method, params).into())
            .await
            .map(|_| ())
    }
}

impl From<StdioTransport> for Transport {
    fn from(t: StdioTransport) -> Self {
        Self::Stdio(t)
    }
}

impl From<HttpTransport> for Transport {
    fn from(t: HttpTransport) -> Self {
        Self::Http(t)
    }
}
