//! Build a [`Transport`] from a raw server config tree.

use {
    relay_config::{HttpServerConfig, StdioServerConfig, resolve_config},
    serde_json::Value,
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    http_transport::HttpTransport,
    stdio_transport::StdioTransport,
    transport::Transport,
};

/// Resolve `${VAR}` placeholders in `raw`, then build the transport it names.
///
/// The returned transport is not yet connected.
pub fn create_transport(raw: &Value) -> Result<Transport> {
    let resolved = resolve_config(raw)?;
    transport_from_resolved(&resolved)
}

/// Build a transport from a tree whose placeholders are already resolved.
pub fn transport_from_resolved(config: &Value) -> Result<Transport> {
    let kind = config.get("transport").and_then(Value::as_str);
    debug!(transport = ?kind, "creating MCP transport");

    match kind {
        Some("stdio") => {
            let cfg: StdioServerConfig = serde_json::from_value(config.clone())
                .map_err(|source| Error::InvalidConfig {
                    transport: "stdio",
                    source,
                })?;
            Ok(StdioTransport::new(cfg).into())
        },
        Some("http") => {
            let cfg: HttpServerConfig =
                serde_json::from_value(config.clone()).map_err(|source| Error::InvalidConfig {
                    transport: "http",
                    source,
                })?;
            Ok(HttpTransport::new(&cfg)?.into())
        },
        Some(other) => Err(Error::UnknownTransport {
            transport: other.to_string(),
        }),
        None => Err(Error::UnknownTransport {
            transport: config
                .get("transport")
                .map_or_else(|| "<missing>".to_string(), Value::to_string),
        }),
    }
}
