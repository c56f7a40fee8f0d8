//! Session operations abstraction
//!
//! A connection's I/O thread talks to its stream through [`SessionOps`], so
//! the same loop serves plain TCP and TLS. A plain session can be upgraded
//! in place once a request asks for TLS.

use super::tls::{TlsConfig, TlsError};
use openssl::ssl::SslStream;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// Session operations trait
///
/// This trait defines the operations that can be performed on a session,
/// abstracting over plain TCP and TLS connections.
pub trait SessionOps: Send {
    /// Wait until the session is ready for the requested operation
    ///
    /// Returns false when the timeout elapsed first.
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool>;

    /// Read data from the session
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf` to the session
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Close the session
    fn close(&mut self) -> io::Result<()>;

    fn is_secure(&self) -> bool;

    /// Switch the session to TLS, performing a client handshake
    ///
    /// Secure sessions return themselves unchanged.
    fn upgrade(
        self: Box<Self>,
        config: &TlsConfig,
        host: Option<&str>,
    ) -> Result<Box<dyn SessionOps>, TlsError>;
}

fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    // SAFETY: `pfd` is a valid pollfd for the duration of the call and the
    // count matches.
    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }

    Ok(result > 0)
}

/// Plain file descriptor session operations
pub struct FdSessionOps {
    stream: TcpStream,
}

impl FdSessionOps {
    /// Create a new FD session operations from a TCP stream
    pub fn new(stream: TcpStream) -> Self {
        FdSessionOps { stream }
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl SessionOps for FdSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }

    fn is_secure(&self) -> bool {
        false
    }

    fn upgrade(
        self: Box<Self>,
        config: &TlsConfig,
        host: Option<&str>,
    ) -> Result<Box<dyn SessionOps>, TlsError> {
        let stream = config.connect(self.stream, host)?;
        Ok(Box::new(TlsSessionOps::new(stream)))
    }
}

/// TLS session operations
///
/// Wraps an OpenSSL `SslStream` established by [`TlsConfig::connect`].
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
    failed: bool,
}

impl TlsSessionOps {
    pub fn new(stream: SslStream<TcpStream>) -> Self {
        TlsSessionOps {
            stream,
            failed: false,
        }
    }

    /// Check if a TLS operation failed on this session
    pub fn failed(&self) -> bool {
        self.failed
    }
}

impl SessionOps for TlsSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool> {
        // Decrypted bytes may already be buffered inside OpenSSL
        if events != PollEvents::Write && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }

        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).inspect_err(|_| self.failed = true)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream
            .write_all(buf)
            .and_then(|()| self.stream.flush())
            .inspect_err(|_| self.failed = true)
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.failed {
            let _ = self.stream.shutdown();
        }
        self.stream.get_mut().shutdown(Shutdown::Both)
    }

    fn is_secure(&self) -> bool {
        true
    }

    fn upgrade(
        self: Box<Self>,
        _config: &TlsConfig,
        _host: Option<&str>,
    ) -> Result<Box<dyn SessionOps>, TlsError> {
        Ok(self)
    }
}
