//! Network addressing and transport plumbing
//!
//! This module defines how destinations are named ([`SystemAddress`]), how
//! host names are resolved for a given address family, and the transport
//! seam the HTTP layer drives ([`Transport`] / [`ConnectionEvents`]).
//!
//! [`TcpTransport`] is the bundled implementation of that seam: one thread
//! per connection, plain TCP via `socket2`, TLS via `openssl`.

pub mod session;
pub mod tcp;
pub mod tls;
pub mod transport;

pub use tcp::{TcpTransport, TcpTransportConfig};
pub use transport::{ConnectionEvents, Transport, MAX_CONNECTIONS};

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// Result type for network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("No {version} address for {host}")]
    AddressFamily { host: String, version: IpVersion },

    #[error("TLS error: {0}")]
    Tls(#[from] tls::TlsError),
}

/// Address family requested for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IpVersion {
    #[default]
    V4,
    V6,
}

impl IpVersion {
    /// Map a numeric IP version to an address family
    ///
    /// Anything other than 6 selects IPv4.
    pub fn from_number(version: u8) -> Self {
        if version == 6 {
            IpVersion::V6
        } else {
            IpVersion::V4
        }
    }

    /// Check whether an IP address belongs to this family
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => f.write_str("IPv4"),
            IpVersion::V6 => f.write_str("IPv6"),
        }
    }
}

/// Identity of a remote endpoint as seen by the transport
///
/// Two addresses are equal when both IP and port match. This is what the
/// HTTP layer uses to pair requests with connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemAddress(SocketAddr);

impl SystemAddress {
    pub fn new(addr: SocketAddr) -> Self {
        SystemAddress(addr)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Same host, different port
    pub fn with_port(mut self, port: u16) -> Self {
        self.0.set_port(port);
        self
    }

    pub fn ip_version(&self) -> IpVersion {
        if self.0.is_ipv6() {
            IpVersion::V6
        } else {
            IpVersion::V4
        }
    }
}

impl From<SocketAddr> for SystemAddress {
    fn from(addr: SocketAddr) -> Self {
        SystemAddress(addr)
    }
}

impl fmt::Display for SystemAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Resolve a host name to a single address of the requested family
///
/// Accepts literal IPv4 and IPv6 addresses (IPv6 optionally in brackets),
/// an optional `host|port` suffix that takes precedence over `port`, and
/// otherwise falls back to the system resolver, picking the first result of
/// the matching family.
pub fn resolve(host: &str, port: u16, version: IpVersion) -> Result<SystemAddress> {
    let (name, port) = split_port(host, port)?;
    let literal = name.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = literal.parse::<IpAddr>() {
        if !version.matches(&ip) {
            return Err(Error::AddressFamily {
                host: host.to_string(),
                version,
            });
        }
        return Ok(SystemAddress::new(SocketAddr::new(ip, port)));
    }

    let candidates = (name, port).to_socket_addrs().map_err(|e| Error::Resolve {
        host: host.to_string(),
        reason: e.to_string(),
    })?;

    candidates
        .into_iter()
        .find(|addr| version.matches(&addr.ip()))
        .map(SystemAddress::new)
        .ok_or_else(|| Error::AddressFamily {
            host: host.to_string(),
            version,
        })
}

fn split_port(host: &str, default_port: u16) -> Result<(&str, u16)> {
    match host.split_once('|') {
        Some((name, port)) => {
            let port = port.parse::<u16>().map_err(|_| Error::Resolve {
                host: host.to_string(),
                reason: format!("invalid port {:?}", port),
            })?;
            Ok((name, port))
        }
        None => Ok((host, default_port)),
    }
}
