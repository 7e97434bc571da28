//! JSON-RPC 2.0 envelopes and the MCP payloads this client exchanges.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

use crate::error::{Error, Result};

/// MCP protocol version we implement.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC "internal error", used for error members that are not objects.
pub const INTERNAL_ERROR: i64 = -32603;

// ── JSON-RPC 2.0 ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// An incoming response. The version tag is not checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Request id as sent by this client. Servers occasionally echo numeric
    /// ids back as strings, so those are accepted too.
    pub fn numeric_id(&self) -> Option<u64> {
        match &self.id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Parse a decoded message as a response, tolerating an `error` member
    /// that is not a well-formed error object (`"error": "boom"`). Such a
    /// response still fails its request instead of being dropped.
    pub fn lenient(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        let error = match map.remove("error") {
            None | Some(Value::Null | Value::Bool(false)) => None,
            Some(raw) => Some(
                serde_json::from_value(raw.clone())
                    .unwrap_or_else(|_| JsonRpcError::from_malformed(raw)),
            ),
        };
        if map.get("jsonrpc").is_some_and(|v| !v.is_string()) {
            map.remove("jsonrpc");
        }
        let mut response: Self = serde_json::from_value(Value::Object(map)).ok()?;
        response.error = error;
        Some(response)
    }

    /// Convert into the caller-facing outcome for `method`.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            Some(err) => Err(Error::from_rpc(method, err)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn from_malformed(raw: Value) -> Self {
        let message = match &raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            code: INTERNAL_ERROR,
            message,
            data: Some(raw),
        }
    }
}

// ── MCP Protocol Types ──────────────────────────────────────────────

/// Client capabilities sent during initialize. We advertise none.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientCapabilities {}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Result from the `initialize` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default)]
    pub server_info: ServerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A tool exposed by an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
    /// Members not modelled here (`annotations`, `_meta`, ...), passed through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<McpToolDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpResourceDef {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesListResult {
    #[serde(default)]
    pub resources: Vec<McpResourceDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPromptDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsListResult {
    #[serde(default)]
    pub prompts: Vec<McpPromptDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCallParams {
    pub name: String,
    pub arguments: Value,
}

/// A content item returned from `tools/call` or `prompts/get`.
///
/// Known kinds keep their extra members (`annotations`, `_meta`) in `extra`;
/// kinds this client does not know are kept verbatim as [`ToolContent::Other`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    #[serde(rename = "audio")]
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    #[serde(rename = "resource")]
    Resource {
        resource: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    #[serde(rename = "resource_link")]
    ResourceLink {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    #[serde(untagged)]
    Other(Value),
}

impl ToolContent {
    /// Text of a `text` item.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// Result from `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCallResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

/// One entry of a `resources/read` result; exactly one of `text`/`blob` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadResourceResult {
    #[serde(default)]
    pub contents: Vec<ResourceContents>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptParams {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: ToolContent,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetPromptResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub messages: Vec<PromptMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn response_accepts_any_version_tag() {
        let json = r#"{"protocol":"2.0","id":1,"result":{"ok":true}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.numeric_id(), Some(1));
        assert_eq!(resp.into_result("test").unwrap(), json!({"ok": true}));
    }

    #[test]
    fn string_ids_are_accepted() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"7","result":{}}"#).unwrap();
        assert_eq!(resp.numeric_id(), Some(7));
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"result":{}}"#).unwrap();
        assert_eq!(resp.numeric_id(), None);
    }

    #[test]
    fn error_response_maps_to_method_not_found() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.into_result("tools/list").unwrap_err();
        assert!(err.is_method_not_found());
    }

    #[test]
    fn error_response_maps_to_protocol_error() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        match resp.into_result("initialize").unwrap_err() {
            Error::Protocol { method, code, .. } => {
                assert_eq!(method, "initialize");
                assert_eq!(code, -32600);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_result_is_null() {
        let resp: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":3}"#).unwrap();
        assert_eq!(resp.into_result("ping").unwrap(), Value::Null);
    }

    #[test]
    fn initialize_params_serialization() {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: "relay".into(),
                version: "0.1.0".into(),
            },
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "relay", "version": "0.1.0" }
            })
        );
    }

    #[test]
    fn tools_list_defaults_to_empty() {
        let result: ToolsListResult = serde_json::from_value(json!({})).unwrap();
        assert!(result.tools.is_empty());
    }

    #[test]
    fn tool_def_deserialization() {
        let json = r#"{"name":"read_file","description":"Read a file","inputSchema":{"type":"object","properties":{"path":{"type":"string"}}}}"#;
        let tool: McpToolDef = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "read_file");
        assert_eq!(tool.input_schema["properties"]["path"]["type"], "string");
    }

    #[test]
    fn tools_call_result_deserialization() {
        let json = r#"{"content":[{"type":"text","text":"hello"},{"type":"resource_link","uri":"file:///a"}],"isError":false}"#;
        let result: ToolsCallResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.content.len(), 2);
        match &result.content[0] {
            ToolContent::Text { text, .. } => assert_eq!(text, "hello"),
            other => panic!("expected text content, got {other:?}"),
        }
    }

    #[test]
    fn prompt_and_resource_results() {
        let prompt: GetPromptResult = serde_json::from_value(json!({
            "description": "Review code",
            "messages": [{ "role": "user", "content": { "type": "text", "text": "review this" } }]
        }))
        .unwrap();
        assert_eq!(prompt.messages[0].role, "user");

        let read: ReadResourceResult = serde_json::from_value(json!({
            "contents": [{ "uri": "file:///tmp/a.txt", "mimeType": "text/plain", "text": "hi" }]
        }))
        .unwrap();
        assert_eq!(read.contents[0].text.as_deref(), Some("hi"));
        assert_eq!(read.contents[0].mime_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn unknown_content_and_extra_members_pass_through() {
        let raw = json!({
            "content": [
                { "type": "text", "text": "hi", "annotations": { "audience": ["user"] } },
                { "type": "chart", "series": [1, 2, 3] }
            ],
            "isError": false,
            "_meta": { "trace": "abc" }
        });
        let result: ToolsCallResult = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(result.content[0].as_text(), Some("hi"));
        match &result.content[1] {
            ToolContent::Other(value) => assert_eq!(value["type"], "chart"),
            other => panic!("expected passthrough content, got {other:?}"),
        }
        assert_eq!(result.extra["_meta"]["trace"], "abc");
        assert_eq!(serde_json::to_value(&result).unwrap(), raw);

        let prompt: GetPromptResult = serde_json::from_value(json!({
            "messages": [{ "role": "assistant", "content": { "type": "widget", "id": 9 } }]
        }))
        .unwrap();
        assert!(matches!(prompt.messages[0].content, ToolContent::Other(_)));
    }

    #[test]
    fn lenient_parse_keeps_malformed_errors() {
        let resp = JsonRpcResponse::lenient(json!({"jsonrpc":"2.0","id":4,"error":"boom"})).unwrap();
        assert_eq!(resp.numeric_id(), Some(4));
        match resp.into_result("tools/call").unwrap_err() {
            Error::Protocol {
                code,
                message,
                data,
                ..
            } => {
                assert_eq!(code, INTERNAL_ERROR);
                assert_eq!(message, "boom");
                assert_eq!(data, Some(json!("boom")));
            },
            other => panic!("unexpected error: {other}"),
        }

        let resp = JsonRpcResponse::lenient(json!({"id":5,"error":{"code":-32601}})).unwrap();
        assert!(resp.into_result("x").unwrap_err().is_method_not_found());

        let resp = JsonRpcResponse::lenient(json!({"id":6,"error":null,"result":1})).unwrap();
        assert_eq!(resp.into_result("x").unwrap(), json!(1));

        let resp = JsonRpcResponse::lenient(json!({"jsonrpc":2,"id":7,"result":{}})).unwrap();
        assert_eq!(resp.numeric_id(), Some(7));

        assert!(JsonRpcResponse::lenient(json!([1, 2])).is_none());
    }
}
