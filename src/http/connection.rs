//! HTTP connection: request submission, dispatch and lifecycle handling
//!
//! [`HttpConnection`] is registered as the [`ConnectionEvents`] listener of
//! a [`Transport`] and does all of its work inside those callbacks or inside
//! caller API calls. A connection carries one request at a time: the next
//! pending request is dispatched when the previous response completes.

use super::ledger::Ledger;
use super::reassembler;
use super::request::{CompletedResponse, OutboundRequest, Request, RequestId};
use super::{ConnectionConfig, Error, Result};
use crate::net::{ConnectionEvents, IpVersion, SystemAddress, Transport};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Asynchronous HTTP client over a [`Transport`]
///
/// `C` is a caller-chosen context value that travels with each request and
/// comes back with its response.
pub struct HttpConnection<C> {
    transport: Arc<dyn Transport>,
    ledger: Ledger<C>,
    config: ConnectionConfig,
}

impl<C: Send> HttpConnection<C> {
    pub fn new(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Self {
        HttpConnection {
            transport,
            ledger: Ledger::new(),
            config,
        }
    }

    /// Submit a request
    ///
    /// Succeeds once the request is queued or sent; network failures later
    /// on are not reported here. Fails without queuing anything when the
    /// host cannot be resolved, or when an explicit address is given that
    /// is not connected.
    ///
    /// # Panics
    ///
    /// Panics if the request asks for IPv6 and the `ipv6` feature is
    /// disabled.
    pub fn submit(&self, request: OutboundRequest<C>) -> Result<RequestId> {
        let estimated = match request.address {
            Some(address) => {
                if !self.is_connected(address) {
                    return Err(Error::NotConnected(address));
                }
                address
            }
            None => self
                .transport
                .resolve(&request.host, request.port, request.ip_version)?,
        }
        .with_port(request.port);

        let mut request = Request::new(request, estimated);
        let id = request.id;

        if !self.is_connected(estimated) {
            let (host, port, version) = (request.host.clone(), request.port, request.ip_version);
            self.ledger.pending().push_back(request);
            debug!(request = %id, address = %estimated, "queued, connecting");
            self.connect(&host, port, version);
            return Ok(id);
        }

        let mut sent = self.ledger.sent();
        // Any in-flight request, to any destination, defers this one
        if !sent.is_empty() {
            self.ledger.pending().push_back(request);
            debug!(request = %id, address = %estimated, "queued behind in-flight request");
            return Ok(id);
        }

        request.completed_address = Some(estimated);
        let (payload, use_tls) = (request.payload.clone(), request.use_tls);
        sent.push_back(request);
        drop(sent);

        debug!(request = %id, address = %estimated, "sending on open connection");
        self.transmit(&payload, estimated, use_tls);
        Ok(id)
    }

    /// Take the oldest completed response, if any
    pub fn try_take_completed(&self) -> Option<CompletedResponse<C>> {
        let request = self.ledger.pop_completed()?;
        debug!(request = %request.id, "response taken");
        Some(request.into_completed())
    }

    /// Whether any request is pending or awaiting its response
    pub fn is_busy(&self) -> bool {
        self.ledger.pending_len() > 0 || self.ledger.sent_len() > 0
    }

    /// Whether a completed response is waiting to be taken
    pub fn has_response(&self) -> bool {
        self.ledger.completed_len() > 0
    }

    /// Drop every pending request resolved to `address`
    ///
    /// Requests already sent are not affected. Returns how many were
    /// dropped.
    pub fn cancel_pending(&self, address: SystemAddress) -> usize {
        let removed = self.ledger.remove_pending_for(address);
        for request in &removed {
            debug!(request = %request.id, %address, "pending request cancelled");
        }
        removed.len()
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.pending_len()
    }

    pub fn sent_count(&self) -> usize {
        self.ledger.sent_len()
    }

    pub fn completed_count(&self) -> usize {
        self.ledger.completed_len()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether the transport lists `address` among its open connections
    pub fn is_connected(&self, address: SystemAddress) -> bool {
        self.transport
            .connections(self.config.connection_list_capacity())
            .contains(&address)
    }

    /// Bind a pending request to the connection at `address` and send it
    ///
    /// A request resolved to `address` is preferred. Failing that, the
    /// oldest pending request is sent here regardless of its destination.
    /// Nothing is sent while a request is still in flight on `address`.
    fn dispatch(&self, address: SystemAddress) {
        let mut sent = self.ledger.sent();
        if sent.iter().any(|r| r.is_bound_to(address)) {
            trace!(%address, "connection busy, dispatch deferred");
            return;
        }
        let Some((mut request, matched)) = self.ledger.take_pending_for(address) else {
            trace!(%address, "nothing pending, connection idle");
            return;
        };

        if !matched {
            debug!(
                request = %request.id,
                %address,
                estimated = %request.estimated_address,
                "binding request to a connection for another destination"
            );
        }

        request.completed_address = Some(address);
        let (id, payload, use_tls) = (request.id, request.payload.clone(), request.use_tls);
        sent.push_back(request);
        drop(sent);

        debug!(request = %id, %address, "request sent");
        self.transmit(&payload, address, use_tls);
    }

    fn transmit(&self, payload: &[u8], address: SystemAddress, use_tls: bool) {
        if use_tls {
            self.transport.start_secure_client(address);
        }
        self.transport.send(payload, address, false);
    }

    /// Issue a connect for the oldest pending request, whatever its target
    fn send_next_pending(&self) {
        if let Some((host, port, version)) = self.ledger.first_pending_target() {
            debug!(%host, port, "connecting for next pending request");
            self.connect(&host, port, version);
        }
    }

    fn connect(&self, host: &str, port: u16, version: IpVersion) {
        assert!(
            version == IpVersion::V4 || cfg!(feature = "ipv6"),
            "IPv6 connection requested but the ipv6 feature is disabled"
        );
        // TLS is started per request right before sending
        self.transport.connect(host, port, false, version);
    }
}

impl<C: Send> ConnectionEvents for HttpConnection<C> {
    fn on_receive(&self, source: SystemAddress, data: &[u8]) {
        let Some(mut request) = self.ledger.take_sent_from(source) else {
            debug!(address = %source, len = data.len(), "no request awaiting data, fragment dropped");
            return;
        };

        trace!(request = %request.id, address = %source, len = data.len(), "fragment received");

        if reassembler::absorb(&mut request, data, self.config.max_chunk_size()) {
            debug!(
                request = %request.id,
                address = %source,
                len = request.received.len(),
                "response complete"
            );
            self.ledger.push_completed(request);
            self.dispatch(source);
        } else {
            self.ledger.push_sent(request);
        }
    }

    fn on_new_connection(&self, address: SystemAddress) {
        debug!(%address, "connection established");
        self.dispatch(address);
    }

    fn on_closed_connection(&self, address: SystemAddress) {
        for mut request in self.ledger.drain_sent_from(address) {
            reassembler::force_complete(&mut request);
            debug!(
                request = %request.id,
                %address,
                len = request.received.len(),
                "connection closed, completing with data received so far"
            );
            self.ledger.push_completed(request);
        }
        self.send_next_pending();
    }

    fn on_failed_connect(&self, address: SystemAddress) {
        for request in self.ledger.remove_pending_for(address) {
            warn!(
                request = %request.id,
                %address,
                host = %request.host,
                "connect failed, pending request dropped"
            );
        }
        self.send_next_pending();
    }
}
