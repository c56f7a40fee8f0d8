//! Transport seam
//!
//! The HTTP layer never touches sockets. It drives a [`Transport`] with
//! fire-and-forget calls and reacts to the events the transport delivers to
//! a registered [`ConnectionEvents`] listener. Events may arrive on any
//! thread the transport owns, so listeners must be `Send + Sync` and must
//! not block.

use super::{IpVersion, Result, SystemAddress};

/// Default upper bound on the number of connections a listing reports
pub const MAX_CONNECTIONS: usize = 64;

/// Reliable-stream connection manager consumed by the HTTP layer
///
/// All methods return immediately. Outcomes of `connect` are reported
/// through [`ConnectionEvents::on_new_connection`] or
/// [`ConnectionEvents::on_failed_connect`].
pub trait Transport: Send + Sync {
    /// Resolve a host name for the given address family
    ///
    /// The default uses the system resolver through [`super::resolve`].
    fn resolve(&self, host: &str, port: u16, version: IpVersion) -> Result<SystemAddress> {
        super::resolve(host, port, version)
    }

    /// Start an asynchronous connection attempt
    fn connect(&self, host: &str, port: u16, secure: bool, version: IpVersion);

    /// Queue bytes for transmission to a connected destination
    ///
    /// With `broadcast` set the bytes go to every open connection and
    /// `destination` is ignored.
    fn send(&self, data: &[u8], destination: SystemAddress, broadcast: bool);

    /// List open connections, at most `capacity` of them
    fn connections(&self, capacity: usize) -> Vec<SystemAddress>;

    /// Upgrade a connection to TLS before its next send
    ///
    /// Calling this on a connection that is already secure has no effect.
    fn start_secure_client(&self, destination: SystemAddress);
}

/// Listener for connection lifecycle and data events
pub trait ConnectionEvents: Send + Sync {
    /// A fragment of stream data arrived from `source`
    fn on_receive(&self, source: SystemAddress, data: &[u8]);

    /// A connection to `address` was established
    fn on_new_connection(&self, address: SystemAddress);

    /// The connection to `address` was closed by either side
    fn on_closed_connection(&self, address: SystemAddress);

    /// A connection attempt to `address` failed
    fn on_failed_connect(&self, address: SystemAddress);
}
