//! MCP (Model Context Protocol) transport and session client.
//!
//! This crate provides:
//! - JSON-RPC 2.0 over a child process's stdio (`stdio_transport`)
//! - JSON-RPC 2.0 over HTTP POST with optional SSE framing (`http_transport`)
//! - A transport factory driven by resolved config trees (`factory`)
//! - MCP client for the handshake and tool/resource/prompt calls (`client`)

pub mod client;
pub mod error;
pub mod factory;
pub mod http_transport;
pub mod message;
mod pending;
pub mod stdio_transport;
pub mod transport;
pub mod types;

pub use {
    client::{McpClient, McpClientState},
    error::{Error, Result},
    factory::{create_transport, transport_from_resolved},
    http_transport::HttpTransport,
    message::{MessageFactory, OutgoingMessage, create_notification},
    stdio_transport::StdioTransport,
    transport::{DEFAULT_REQUEST_TIMEOUT, Transport},
};
