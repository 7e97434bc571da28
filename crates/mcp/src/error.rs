use std::time::Duration;

use {relay_common::FromMessage, serde_json::Value};

use crate::{
    client::McpClientState,
    types::{JsonRpcError, METHOD_NOT_FOUND},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The child exited during the startup grace period.
    #[error("MCP server process terminated unexpectedly{}", exit_suffix(*code))]
    ProcessTerminated { code: Option<i32> },
    /// The child exited (or was closed) while requests were outstanding.
    #[error("MCP server process closed{}", exit_suffix(*code))]
    ProcessClosed { code: Option<i32> },
    #[error("transport is not connected")]
    NotConnected,
    #[error("MCP request '{method}' timed out after {}ms", timeout.as_millis())]
    RequestTimeout { method: String, timeout: Duration },
    #[error("JSON-RPC error on '{method}': code={code} message={message}")]
    Protocol {
        method: String,
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("JSON-RPC error on '{method}': method not found ({message})")]
    MethodNotFound { method: String, message: String },
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("failed to parse SSE response: {body}")]
    MalformedSse { body: String },
    #[error("unknown transport: {transport}")]
    UnknownTransport { transport: String },
    #[error("invalid {transport} transport config: {source}")]
    InvalidConfig {
        transport: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] relay_config::Error),
    #[error("MCP client is not initialized (state: {state:?})")]
    NotInitialized { state: McpClientState },
    #[error("tool \"{requested}\" not found. Available tools: {}", available.join(", "))]
    ToolNotFound {
        requested: String,
        available: Vec<String>,
    },
    #[error("tool \"{name}\" failed: {source}")]
    ToolCallFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
    #[error("{message}")]
    Message { message: String },
}

fn exit_suffix(code: Option<i32>) -> String {
    code.map(|c| format!(" with code {c}")).unwrap_or_default()
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Classify a JSON-RPC `error` member received for `method`.
    pub fn from_rpc(method: &str, err: JsonRpcError) -> Self {
        if err.code == METHOD_NOT_FOUND {
            Self::MethodNotFound {
                method: method.into(),
                message: err.message,
            }
        } else {
            Self::Protocol {
                method: method.into(),
                code: err.code,
                message: err.message,
                data: err.data,
            }
        }
    }

    pub fn is_method_not_found(&self) -> bool {
        matches!(self, Self::MethodNotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

relay_common::impl_context!();

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::error::Error as _};

    #[test]
    fn exit_code_is_reported_when_known() {
        assert_eq!(
            Error::ProcessClosed { code: Some(3) }.to_string(),
            "MCP server process closed with code 3"
        );
        assert_eq!(
            Error::ProcessTerminated { code: None }.to_string(),
            "MCP server process terminated unexpectedly"
        );
    }

    #[test]
    fn tool_not_found_lists_available_tools() {
        let err = Error::ToolNotFound {
            requested: "missing_tool".into(),
            available: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "tool \"missing_tool\" not found. Available tools: a, b"
        );
    }

    #[test]
    fn tool_call_failure_keeps_cause() {
        let err = Error::ToolCallFailed {
            name: "search".into(),
            source: Box::new(Error::RequestTimeout {
                method: "tools/call".into(),
                timeout: Duration::from_millis(250),
            }),
        };
        assert_eq!(
            err.to_string(),
            "tool \"search\" failed: MCP request 'tools/call' timed out after 250ms"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn rpc_errors_are_classified_by_code() {
        let not_found = Error::from_rpc("prompts/list", JsonRpcError {
            code: METHOD_NOT_FOUND,
            message: "Method not found".into(),
            data: None,
        });
        assert!(not_found.is_method_not_found());

        let other = Error::from_rpc("tools/call", JsonRpcError {
            code: -32602,
            message: "Invalid params".into(),
            data: None,
        });
        assert!(!other.is_method_not_found());
        assert!(other.to_string().contains("code=-32602"));
    }
}
