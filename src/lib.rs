//! pollhttp - callback-driven HTTP/1.1 client over a pluggable TCP transport
//!
//! Requests are queued without blocking, bound to connections as the
//! transport reports them, reassembled from arbitrarily fragmented reads and
//! handed back through a poll-style retrieval call.
//!
//! - [`http`] holds the request ledger, dispatcher and response reassembler
//! - [`net`] holds addressing, the transport traits and a concrete
//!   thread-per-connection TCP transport

pub mod http;
pub mod net;
