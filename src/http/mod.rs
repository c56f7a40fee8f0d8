//! Callback-driven HTTP/1.1 client
//!
//! [`HttpConnection`] keeps every in-flight request in one of three queues:
//! pending (waiting for a connection), sent (transmitted, response being
//! reassembled) and completed (ready for pickup). It owns no thread. All
//! progress happens inside the [`ConnectionEvents`] callbacks a
//! [`Transport`] delivers, and callers collect results by polling.
//!
//! # Examples
//!
//! ```no_run
//! use pollhttp::http::{ConnectionConfig, HttpConnection, HttpRequest, OutboundRequest};
//! use pollhttp::net::TcpTransport;
//! use std::sync::Arc;
//!
//! let transport = TcpTransport::default();
//! let client: Arc<HttpConnection<u32>> =
//!     Arc::new(HttpConnection::new(Arc::new(transport.clone()), ConnectionConfig::default()));
//! transport.set_listener(&client);
//!
//! let payload = HttpRequest::get("example.com", "/").to_wire();
//! client.submit(OutboundRequest::new(payload, "example.com", 80, 7)).unwrap();
//!
//! loop {
//!     if let Some(response) = client.try_take_completed() {
//!         assert_eq!(*response.user_context(), 7);
//!         println!("{}", String::from_utf8_lossy(response.body()));
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! ```
//!
//! [`ConnectionEvents`]: crate::net::ConnectionEvents
//! [`Transport`]: crate::net::Transport

pub mod chunked;
pub mod config;
pub mod connection;
pub mod headers;
mod ledger;
pub mod message;
pub mod parser;
mod reassembler;
pub mod request;

pub use config::ConnectionConfig;
pub use connection::HttpConnection;
pub use headers::Headers;
pub use message::{HttpRequest, Method, Status, Version};
pub use request::{CompletedResponse, OutboundRequest, RequestId};

use crate::net::SystemAddress;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Resolution failed: {0}")]
    Resolve(#[from] crate::net::Error),

    #[error("Not connected to {0}")]
    NotConnected(SystemAddress),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// Maximum number of headers kept when inspecting a response
pub const MAX_HEADERS: usize = 64;

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// CRLF line ending
pub const CRLF: &str = "\r\n";

/// Separator between header block and body
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Header prefix scanned for the body length
pub const CONTENT_LENGTH_MARKER: &[u8] = b"Content-Length: ";

/// Header line that switches a response to chunked decoding
pub const CHUNKED_MARKER: &[u8] = b"Transfer-Encoding: chunked";

/// Chunk sizes at or above this are treated as corrupt input
pub const MAX_CHUNK_SIZE: usize = 50_000;
