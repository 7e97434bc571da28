//! CLI commands that open one MCP session, run a single operation and print
//! the result as JSON.

use std::path::PathBuf;

use {
    anyhow::{Context, bail},
    clap::Subcommand,
    relay_config::{StdioServerConfig, find_config_file, load_config_value},
    relay_mcp::McpClient,
    serde_json::{Map, Value, json},
    tracing::{debug, warn},
};

/// Where the server comes from: a config file or an inline target.
pub struct Target {
    pub config: Option<PathBuf>,
    pub stdio: Option<String>,
    pub http: Option<String>,
    pub headers: Vec<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum McpCommand {
    /// List the server's tools.
    List,
    /// Call a tool.
    Call {
        /// Tool name.
        tool: String,
        /// Arguments as a JSON object.
        #[arg(default_value = "{}")]
        args: String,
    },
    /// Read a resource.
    Resource {
        /// Resource URI.
        uri: String,
    },
    /// Get a prompt.
    Prompt {
        /// Prompt name.
        name: String,
        /// Arguments as a JSON object.
        #[arg(default_value = "{}")]
        args: String,
    },
    /// Print server info plus all tools, resources and prompts.
    Schema,
}

impl Target {
    /// Build the raw server config tree. Placeholders stay unresolved; the
    /// client resolves them on connect.
    pub fn server_config(&self) -> anyhow::Result<Value> {
        let mut config = if let Some(line) = &self.stdio {
            let stdio = StdioServerConfig::from_command_line(line)?;
            json!({
                "transport": "stdio",
                "command": stdio.command,
                "args": stdio.args,
            })
        } else if let Some(url) = &self.http {
            let mut headers = Map::new();
            for raw in &self.headers {
                let (name, value) = parse_header(raw)?;
                headers.insert(name, Value::String(value));
            }
            json!({
                "transport": "http",
                "url": url,
                "headers": headers,
            })
        } else {
            let path = match &self.config {
                Some(path) => path.clone(),
                None => find_config_file().context(
                    "no MCP config found (looked for ./mcp.{toml,yaml,yml,json} and the user \
                     config directory); pass --config, --stdio or --http",
                )?,
            };
            debug!(path = %path.display(), "loading MCP server config");
            load_config_value(&path)?
        };

        if let Some(ms) = self.timeout_ms {
            let Some(obj) = config.as_object_mut() else {
                bail!("MCP server config must be a mapping");
            };
            // Both spellings deserialize into the same field; keep only one.
            obj.remove("timeoutMs");
            obj.insert("timeout_ms".into(), json!(ms));
        }
        Ok(config)
    }
}

/// Split `"Name: value"` at the first colon.
fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("invalid header '{raw}': expected \"Name: value\"");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid header '{raw}': empty name");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_args(raw: &str) -> serde_json::Result<Value> {
    serde_json::from_str(raw)
}

/// Connect, run `command`, and always close the session before returning.
pub async fn run(server: &Value, command: McpCommand) -> anyhow::Result<Value> {
    let mut client = McpClient::connect(server).await?;
    let result = execute(&client, command).await;
    client.close().await;
    result
}

async fn execute(client: &McpClient, command: McpCommand) -> anyhow::Result<Value> {
    match command {
        McpCommand::List => {
            let tools = client.list_tools().await?;
            Ok(json!({ "tools": tools }))
        },
        McpCommand::Call { tool, args } => {
            let arguments = match parse_args(&args) {
                Ok(arguments) => arguments,
                Err(e) => return Err(invalid_tool_args(client, &tool, e).await),
            };
            let result = client.call_tool(&tool, arguments).await?;
            Ok(serde_json::to_value(result)?)
        },
        McpCommand::Resource { uri } => {
            let result = client.read_resource(&uri).await?;
            Ok(serde_json::to_value(result)?)
        },
        McpCommand::Prompt { name, args } => {
            let arguments = parse_args(&args)
                .with_context(|| format!("invalid JSON arguments for prompt '{name}'"))?;
            let result = client.get_prompt(&name, arguments).await?;
            Ok(serde_json::to_value(result)?)
        },
        McpCommand::Schema => {
            let (tools, resources, prompts) = tokio::try_join!(
                client.list_tools(),
                client.list_resources(),
                client.list_prompts()
            )?;
            Ok(json!({
                "serverInfo": client.server_info(),
                "tools": tools,
                "resources": resources,
                "prompts": prompts,
            }))
        },
    }
}

/// Describe bad tool arguments, including the tool's input schema when the
/// server knows the tool.
async fn invalid_tool_args(
    client: &McpClient,
    tool: &str,
    err: serde_json::Error,
) -> anyhow::Error {
    let schema = match client.list_tools().await {
        Ok(tools) => tools
            .into_iter()
            .find(|t| t.name == tool)
            .map(|t| t.input_schema),
        Err(e) => {
            warn!(error = %e, "failed to list tools for argument diagnostics");
            None
        },
    };

    match schema.and_then(|s| serde_json::to_string_pretty(&s).ok()) {
        Some(schema) => anyhow::anyhow!(
            "invalid JSON arguments for tool '{tool}': {err}\nexpected input schema:\n{schema}"
        ),
        None => anyhow::anyhow!("invalid JSON arguments for tool '{tool}': {err}"),
    }
}
