//! HTTP transport for remote MCP servers (Streamable HTTP).
//!
//! Every message is one POST. The server answers either with a JSON body or a
//! short `text/event-stream` body carrying the response in a `data:` line.

use std::time::Duration;

use {
    relay_config::HttpServerConfig,
    reqwest::{
        Client, Response,
        header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
    },
    serde_json::Value,
    tokio::sync::RwLock,
    tracing::{debug, trace, warn},
};

use crate::{
    error::{Context, Error, Result},
    message::{MessageFactory, OutgoingMessage},
    transport::DEFAULT_REQUEST_TIMEOUT,
    types::{JsonRpcResponse, PROTOCOL_VERSION},
};

const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const MCP_SESSION_ID_HEADER: &str = "Mcp-Session-Id";
const STREAMABLE_ACCEPT_HEADER: &str = "application/json, text/event-stream";
const SSE_HEARTBEAT: &str = "ping";

/// HTTP-based transport for a remote MCP server.
pub struct HttpTransport {
    client: Client,
    url: String,
    headers: HeaderMap,
    ids: MessageFactory,
    request_timeout: Duration,
    /// Session identifier handed out by the server; echoed on every request.
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(config: &HttpServerConfig) -> Result<Self> {
        url::Url::parse(&config.url)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name '{name}'"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header '{name}'"))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .build()
            .context("failed to build HTTP client for MCP transport")?;

        Ok(Self {
            client,
            url: config.url.clone(),
            headers,
            ids: MessageFactory::new(),
            request_timeout: config.request_timeout().unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            session_id: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn messages(&self) -> &MessageFactory {
        &self.ids
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    /// Forget the session token. No traffic is sent.
    pub async fn close(&self) {
        if self.session_id.write().await.take().is_some() {
            debug!(url = %self.url, "dropped MCP streamable HTTP session id");
        }
    }

    pub async fn send(&self, message: OutgoingMessage) -> Result<Option<Value>> {
        self.send_with_timeout(message, self.request_timeout).await
    }

    /// POST `message`. Notifications resolve to `None` as soon as the server
    /// acknowledges them; requests resolve to the response's `result`.
    pub async fn send_with_timeout(
        &self,
        message: OutgoingMessage,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        let method = message.method();
        debug!(method = %method, id = ?message.id(), url = %self.url, "HTTP client -> server");

        let mut req = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, STREAMABLE_ACCEPT_HEADER)
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);
        if let Some(session_id) = self.session_id.read().await.clone() {
            req = req.header(MCP_SESSION_ID_HEADER, session_id);
        }

        let http_resp = req.json(&message).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::RequestTimeout {
                    method: method.into(),
                    timeout,
                }
            } else {
                warn!(
                    url = %self.url,
                    method = %method,
                    error = %e,
                    "HTTP POST to MCP server failed"
                );
                Error::Reqwest(e)
            }
        })?;

        self.store_session_id(&http_resp).await;

        let status = http_resp.status();
        let is_event_stream = response_is_event_stream(&http_resp);
        let body = http_resp
            .text()
            .await
            .with_context(|| format!("failed to read response body for '{method}'"))?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        if message.id().is_none() {
            return Ok(None);
        }

        trace!(method = %method, body = %body, "HTTP server -> client");
        let resp = if is_event_stream {
            parse_event_stream(&body)?
        } else {
            let value = serde_json::from_str::<Value>(&body)
                .with_context(|| format!("failed to parse JSON-RPC response for '{method}'"))?;
            JsonRpcResponse::lenient(value)
                .with_context(|| format!("response to '{method}' is not a JSON-RPC object"))?
        };

        resp.into_result(method).map(Some)
    }

    async fn store_session_id(&self, response: &Response) {
        let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return;
        };

        let mut slot = self.session_id.write().await;
        if slot.as_deref() != Some(session_id) {
            debug!(
                url = %self.url,
                session_id = %session_id,
                "updated MCP streamable HTTP session id"
            );
            *slot = Some(session_id.to_string());
        }
    }
}

fn response_is_event_stream(resp: &Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|base| base.trim().eq_ignore_ascii_case("text/event-stream"))
}

/// Take the first `data:` payload that parses as JSON, skipping heartbeats.
fn parse_event_stream(body: &str) -> Result<JsonRpcResponse> {
    body.lines()
        .filter_map(|line| line.trim_end().strip_prefix("data:"))
        .map(str::trim_start)
        .filter(|data| !data.is_empty() && *data != SSE_HEARTBEAT)
        .find_map(|data| {
            serde_json::from_str::<Value>(data)
                .ok()
                .and_then(JsonRpcResponse::lenient)
        })
        .ok_or_else(|| Error::MalformedSse {
            body: body.to_string(),
        })
}
