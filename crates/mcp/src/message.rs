//! Construction of outgoing JSON-RPC messages.

use std::sync::atomic::{AtomicU64, Ordering};

use {
    serde::Serialize,
    serde_json::{Map, Value},
};

use crate::{
    error::Result,
    types::{JSONRPC_VERSION, JsonRpcNotification, JsonRpcRequest},
};

/// Hands out request ids for one transport, starting at 1.
///
/// Every transport owns its own factory so independent sessions in the same
/// process never share an id space.
#[derive(Debug)]
pub struct MessageFactory {
    next_id: AtomicU64,
}

impl Default for MessageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFactory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a request with a freshly incremented id. Missing params are sent
    /// as an empty object.
    pub fn create_request(&self, method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.into(),
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            method: method.into(),
            params: params.unwrap_or_else(|| Value::Object(Map::new())),
        }
    }
}

/// Build a notification. `params` is omitted entirely when absent or empty.
pub fn create_notification(method: &str, params: Option<Value>) -> JsonRpcNotification {
    let params = params.filter(|p| match p {
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
        _ => true,
    });
    JsonRpcNotification {
        jsonrpc: JSONRPC_VERSION.into(),
        method: method.into(),
        params,
    }
}

/// Anything a transport can put on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

impl OutgoingMessage {
    /// `None` for notifications, which never produce a response.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Request(req) => Some(req.id),
            Self::Notification(_) => None,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(n) => &n.method,
        }
    }

    /// Serialize as a single newline-terminated line.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl From<JsonRpcRequest> for OutgoingMessage {
    fn from(req: JsonRpcRequest) -> Self {
        Self::Request(req)
    }
}

impl From<JsonRpcNotification> for OutgoingMessage {
    fn from(n: JsonRpcNotification) -> Self {
        Self::Notification(n)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn ids_start_at_one_and_increase() {
        let factory = MessageFactory::new();
        let ids: Vec<u64> = (0..3)
            .map(|_| factory.create_request("ping", None).id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn factories_do_not_share_ids() {
        let a = MessageFactory::new();
        let b = MessageFactory::new();
        a.create_request("x", None);
        a.create_request("x", None);
        assert_eq!(b.create_request("x", None).id, 1);
    }

    #[test]
    fn request_params_default_to_empty_object() {
        let req = MessageFactory::new().create_request("tools/list", None);
        let line = OutgoingMessage::from(req).to_line().unwrap();
        assert_eq!(
            line,
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\",\"params\":{}}\n"
        );
    }

    #[test]
    fn notification_omits_empty_params() {
        let empty = create_notification("notifications/initialized", Some(json!({})));
        assert_eq!(
            serde_json::to_value(&empty).unwrap(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        );

        let with = create_notification("notifications/progress", Some(json!({"progress": 1})));
        assert_eq!(
            serde_json::to_value(&with).unwrap()["params"],
            json!({"progress": 1})
        );
    }

    #[test]
    fn outgoing_message_reports_id_and_method() {
        let req: OutgoingMessage = MessageFactory::new().create_request("initialize", None).into();
        assert_eq!(req.id(), Some(1));
        assert_eq!(req.method(), "initialize");

        let note: OutgoingMessage = create_notification("notifications/initialized", None).into();
        assert_eq!(note.id(), None);
        assert!(!note.to_line().unwrap().contains("\"id\""));
    }
}
