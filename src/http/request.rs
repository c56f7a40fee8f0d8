//! Request records and the values exchanged with callers
//!
//! A caller hands in an [`OutboundRequest`], the ledger tracks it as a
//! [`Request`] while it moves through the queues, and the caller gets a
//! [`CompletedResponse`] back once reassembly finishes or the connection
//! goes away.

use super::parser::parse_head;
use super::reassembler::ParseState;
use super::{Headers, HttpRequest, Status, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use crate::net::{IpVersion, SystemAddress};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique request identifier, increasing in submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        RequestId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request as submitted by the caller
///
/// `payload` is transmitted verbatim; use
/// [`HttpRequest::to_wire`](super::HttpRequest::to_wire) to build one.
#[derive(Debug, Clone)]
pub struct OutboundRequest<C> {
    pub(crate) payload: Bytes,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) use_tls: bool,
    pub(crate) ip_version: IpVersion,
    pub(crate) address: Option<SystemAddress>,
    pub(crate) user_context: C,
}

impl<C> OutboundRequest<C> {
    pub fn new(
        payload: impl Into<Bytes>,
        host: impl Into<String>,
        port: u16,
        user_context: C,
    ) -> Self {
        OutboundRequest {
            payload: payload.into(),
            host: host.into(),
            port,
            use_tls: false,
            ip_version: IpVersion::V4,
            address: None,
            user_context,
        }
    }

    /// Wrap a built request for its own host on the default port
    ///
    /// Port 443 with TLS when `use_tls` is set, port 80 otherwise.
    pub fn from_http(request: &HttpRequest, use_tls: bool, user_context: C) -> Self {
        let port = if use_tls { DEFAULT_HTTPS_PORT } else { DEFAULT_HTTP_PORT };
        Self::new(request.to_wire(), request.host(), port, user_context).use_tls(use_tls)
    }

    /// Start TLS on the connection before transmitting
    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn ip_version(mut self, version: IpVersion) -> Self {
        self.ip_version = version;
        self
    }

    /// Send over an existing connection instead of resolving `host`
    ///
    /// Submission fails unless `address` is connected. The request port
    /// still replaces the port of `address`.
    pub fn address(mut self, address: SystemAddress) -> Self {
        self.address = Some(address);
        self
    }
}

/// In-flight request record, owned by exactly one ledger queue
pub(crate) struct Request<C> {
    pub(crate) id: RequestId,
    pub(crate) host: String,
    pub(crate) estimated_address: SystemAddress,
    pub(crate) completed_address: Option<SystemAddress>,
    pub(crate) port: u16,
    pub(crate) use_tls: bool,
    pub(crate) ip_version: IpVersion,
    pub(crate) payload: Bytes,
    pub(crate) user_context: C,
    pub(crate) received: BytesMut,
    /// `None`: headers done but no body byte to point at
    pub(crate) body_offset: Option<usize>,
    pub(crate) chunked: bool,
    pub(crate) state: ParseState,
}

impl<C> Request<C> {
    pub(crate) fn new(outbound: OutboundRequest<C>, estimated_address: SystemAddress) -> Self {
        Request {
            id: RequestId::next(),
            host: outbound.host,
            estimated_address,
            completed_address: None,
            port: outbound.port,
            use_tls: outbound.use_tls,
            ip_version: outbound.ip_version,
            payload: outbound.payload,
            user_context: outbound.user_context,
            received: BytesMut::new(),
            body_offset: Some(0),
            chunked: false,
            state: ParseState::default(),
        }
    }

    /// Destination the request was bound to, or the resolved one if unbound
    pub(crate) fn address(&self) -> SystemAddress {
        self.completed_address.unwrap_or(self.estimated_address)
    }

    pub(crate) fn is_bound_to(&self, address: SystemAddress) -> bool {
        self.completed_address == Some(address)
    }

    pub(crate) fn into_completed(self) -> CompletedResponse<C> {
        CompletedResponse {
            id: self.id,
            address: self.address(),
            outbound_payload: self.payload,
            host: self.host,
            response: self.received.freeze(),
            body_offset: self.body_offset,
            chunked: self.chunked,
            user_context: self.user_context,
        }
    }
}

impl<C> fmt::Debug for Request<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("estimated_address", &self.estimated_address)
            .field("completed_address", &self.completed_address)
            .field("received", &self.received.len())
            .field("body_offset", &self.body_offset)
            .field("state", &self.state)
            .finish()
    }
}

/// A finished (or force-completed) response
///
/// Responses cut short by a closed connection are delivered as they are;
/// compare [`body`](Self::body) against the expected length to detect
/// truncation.
#[derive(Debug, Clone)]
pub struct CompletedResponse<C> {
    id: RequestId,
    outbound_payload: Bytes,
    host: String,
    response: Bytes,
    address: SystemAddress,
    body_offset: Option<usize>,
    chunked: bool,
    user_context: C,
}

impl<C> CompletedResponse<C> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Bytes that were transmitted
    pub fn outbound_payload(&self) -> &[u8] {
        &self.outbound_payload
    }

    /// Host name as given at submission
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Raw response bytes; for chunked responses only the decoded body
    pub fn response(&self) -> &[u8] {
        &self.response
    }

    /// Address of the connection that carried the response
    pub fn address(&self) -> SystemAddress {
        self.address
    }

    pub fn body_offset(&self) -> Option<usize> {
        self.body_offset
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn user_context(&self) -> &C {
        &self.user_context
    }

    pub fn into_user_context(self) -> C {
        self.user_context
    }

    /// Body bytes, empty when there is no body offset
    pub fn body(&self) -> &[u8] {
        match self.body_offset {
            Some(offset) => self.response.get(offset..).unwrap_or_default(),
            None => &[],
        }
    }

    /// Status code from the status line
    ///
    /// `None` for chunked responses, whose head is not retained, and for
    /// responses that do not start with a valid status line.
    pub fn status(&self) -> Option<Status> {
        if self.chunked {
            return None;
        }
        parse_head(&self.response).ok().map(|(_, status, _, _)| status)
    }

    /// Headers received before the body
    pub fn headers(&self) -> Option<Headers> {
        if self.chunked {
            return None;
        }
        parse_head(&self.response).ok().map(|(_, _, _, headers)| headers)
    }
}
