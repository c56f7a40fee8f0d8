//! Thread-per-connection TCP transport
//!
//! Each `connect` spawns a thread that resolves the host, opens a `socket2`
//! socket with a bounded connect timeout and then stays on as the
//! connection's I/O thread. The thread owns the stream. Other threads talk
//! to it through a command channel, so every [`Transport`] call returns
//! immediately. Between commands the thread polls the stream for input and
//! forwards whatever it reads to the registered listener.
//!
//! Connections are keyed by remote address. A connect to an address that is
//! already open or still connecting is ignored, which keeps one stream per
//! destination.

use super::session::{FdSessionOps, PollEvents, SessionOps};
use super::tls::{TlsConfig, TlsError};
use super::transport::{ConnectionEvents, Transport};
use super::{resolve, IpVersion, SystemAddress};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::thread;
use std::time::Duration;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    connect_timeout: Duration,
    poll_interval: Duration,
    read_buffer_size: usize,
    nodelay: bool,
    tls: Option<TlsConfig>,
}

impl TcpTransportConfig {
    pub fn builder() -> TcpTransportConfigBuilder {
        TcpTransportConfigBuilder::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        TcpTransportConfigBuilder::default().build()
    }
}

/// Builder for [`TcpTransportConfig`]
#[derive(Debug)]
pub struct TcpTransportConfigBuilder {
    connect_timeout: Duration,
    poll_interval: Duration,
    read_buffer_size: usize,
    nodelay: bool,
    tls: Option<TlsConfig>,
}

impl Default for TcpTransportConfigBuilder {
    fn default() -> Self {
        TcpTransportConfigBuilder {
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
            read_buffer_size: 4096,
            nodelay: true,
            tls: None,
        }
    }
}

impl TcpTransportConfigBuilder {
    /// Upper bound on a single connection attempt
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How long an I/O thread waits for input before servicing commands
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Size of the per-connection read buffer, i.e. the largest fragment
    /// delivered in one `on_receive`
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// TLS client configuration used for secure connections
    ///
    /// Without one, a non-verifying client context is built on first use.
    pub fn tls(mut self, config: TlsConfig) -> Self {
        self.tls = Some(config);
        self
    }

    pub fn build(self) -> TcpTransportConfig {
        TcpTransportConfig {
            connect_timeout: self.connect_timeout,
            poll_interval: self.poll_interval,
            read_buffer_size: self.read_buffer_size,
            nodelay: self.nodelay,
            tls: self.tls,
        }
    }
}

enum Command {
    Send(Vec<u8>),
    StartTls,
    Close,
}

#[derive(Default)]
struct Table {
    open: HashMap<SystemAddress, Sender<Command>>,
    // Insertion order of `open`, so listings are stable
    order: Vec<SystemAddress>,
    connecting: HashSet<SystemAddress>,
}

struct Shared {
    config: TcpTransportConfig,
    listener: RwLock<Option<Weak<dyn ConnectionEvents>>>,
    table: Mutex<Table>,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, event: impl FnOnce(&dyn ConnectionEvents)) {
        let listener = match self.listener.read() {
            Ok(guard) => guard.as_ref().and_then(Weak::upgrade),
            Err(poisoned) => poisoned.into_inner().as_ref().and_then(Weak::upgrade),
        };
        match listener {
            Some(listener) => event(listener.as_ref()),
            None => tracing::debug!("no listener registered, dropping transport event"),
        }
    }

    fn tls_config(&self) -> Result<TlsConfig, TlsError> {
        match &self.config.tls {
            Some(config) => Ok(config.clone()),
            None => TlsConfig::client().build(),
        }
    }
}

/// TCP implementation of [`Transport`]
///
/// Cloning yields another handle to the same set of connections.
#[derive(Clone)]
pub struct TcpTransport {
    shared: Arc<Shared>,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig) -> Self {
        TcpTransport {
            shared: Arc::new(Shared {
                config,
                listener: RwLock::new(None),
                table: Mutex::new(Table::default()),
            }),
        }
    }

    /// Register the receiver of connection events
    ///
    /// Only a weak reference is kept; events stop once the listener is
    /// dropped.
    pub fn set_listener<L: ConnectionEvents + 'static>(&self, listener: &Arc<L>) {
        let weak = Arc::downgrade(listener) as Weak<dyn ConnectionEvents>;
        match self.shared.listener.write() {
            Ok(mut guard) => *guard = Some(weak),
            Err(poisoned) => *poisoned.into_inner() = Some(weak),
        }
    }

    /// Close one connection; returns false if it was not open
    pub fn close(&self, address: SystemAddress) -> bool {
        let table = self.shared.table();
        match table.open.get(&address) {
            Some(commands) => commands.send(Command::Close).is_ok(),
            None => false,
        }
    }

    /// Close every open connection
    pub fn shutdown(&self) {
        let table = self.shared.table();
        for commands in table.open.values() {
            let _ = commands.send(Command::Close);
        }
    }

    fn command(&self, destination: SystemAddress, command: Command) {
        let table = self.shared.table();
        match table.open.get(&destination) {
            Some(commands) => {
                if commands.send(command).is_err() {
                    tracing::debug!(%destination, "connection thread already gone");
                }
            }
            None => tracing::warn!(%destination, "no open connection"),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TcpTransportConfig::default())
    }
}

impl Transport for TcpTransport {
    fn connect(&self, host: &str, port: u16, secure: bool, version: IpVersion) {
        let shared = Arc::clone(&self.shared);
        let host = host.to_string();
        let spawned = thread::Builder::new()
            .name(format!("pollhttp-{}", host))
            .spawn(move || run_connection(shared, host, port, secure, version));

        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn connection thread");
        }
    }

    fn send(&self, data: &[u8], destination: SystemAddress, broadcast: bool) {
        if broadcast {
            let table = self.shared.table();
            for commands in table.open.values() {
                let _ = commands.send(Command::Send(data.to_vec()));
            }
            return;
        }
        self.command(destination, Command::Send(data.to_vec()));
    }

    fn connections(&self, capacity: usize) -> Vec<SystemAddress> {
        let table = self.shared.table();
        table.order.iter().take(capacity).copied().collect()
    }

    fn start_secure_client(&self, destination: SystemAddress) {
        self.command(destination, Command::StartTls);
    }
}

fn open_stream(config: &TcpTransportConfig, address: SystemAddress) -> io::Result<TcpStream> {
    let target = address.socket_addr();
    let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(config.nodelay)?;
    socket.connect_timeout(&target.into(), config.connect_timeout)?;

    Ok(socket.into())
}

fn run_connection(shared: Arc<Shared>, host: String, port: u16, secure: bool, version: IpVersion) {
    let address = match resolve(&host, port, version) {
        Ok(address) => address,
        Err(e) => {
            tracing::warn!(%host, port, error = %e, "cannot resolve connection target");
            return;
        }
    };

    let already_open = {
        let mut table = shared.table();
        if table.open.contains_key(&address) {
            true
        } else if !table.connecting.insert(address) {
            tracing::debug!(%address, "connection already in progress");
            return;
        } else {
            false
        }
    };

    // Report an open connection again rather than opening a second stream
    if already_open {
        tracing::debug!(%address, "connection already open");
        shared.notify(|listener| listener.on_new_connection(address));
        return;
    }

    let mut session: Box<dyn SessionOps> = match open_stream(&shared.config, address) {
        Ok(stream) => Box::new(FdSessionOps::new(stream)),
        Err(e) => {
            shared.table().connecting.remove(&address);
            tracing::warn!(%address, error = %e, "connect failed");
            shared.notify(|listener| listener.on_failed_connect(address));
            return;
        }
    };

    if secure {
        match shared.tls_config().and_then(|tls| session.upgrade(&tls, Some(&host))) {
            Ok(upgraded) => session = upgraded,
            Err(e) => {
                shared.table().connecting.remove(&address);
                tracing::warn!(%address, error = %e, "TLS handshake failed");
                shared.notify(|listener| listener.on_failed_connect(address));
                return;
            }
        }
    }

    let (commands, inbox) = mpsc::channel();
    {
        let mut table = shared.table();
        table.connecting.remove(&address);
        table.open.insert(address, commands);
        table.order.push(address);
    }

    tracing::info!(%address, %host, secure, "connection established");
    shared.notify(|listener| listener.on_new_connection(address));

    serve(&shared, address, &host, session, inbox);

    {
        let mut table = shared.table();
        table.open.remove(&address);
        table.order.retain(|a| *a != address);
    }

    tracing::info!(%address, "connection closed");
    shared.notify(|listener| listener.on_closed_connection(address));
}

fn serve(
    shared: &Shared,
    address: SystemAddress,
    host: &str,
    mut session: Box<dyn SessionOps>,
    inbox: Receiver<Command>,
) {
    let mut buf = vec![0u8; shared.config.read_buffer_size];

    loop {
        loop {
            match inbox.try_recv() {
                Ok(Command::Send(data)) => {
                    if let Err(e) = session.write_all(&data) {
                        tracing::warn!(%address, error = %e, "write failed");
                        let _ = session.close();
                        return;
                    }
                    tracing::trace!(%address, bytes = data.len(), "sent");
                }
                Ok(Command::StartTls) => {
                    if session.is_secure() {
                        continue;
                    }
                    match shared.tls_config().and_then(|tls| session.upgrade(&tls, Some(host))) {
                        Ok(upgraded) => {
                            tracing::debug!(%address, "TLS session started");
                            session = upgraded;
                        }
                        Err(e) => {
                            // The plain stream was consumed by the attempt
                            tracing::warn!(%address, error = %e, "TLS upgrade failed");
                            return;
                        }
                    }
                }
                Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                    let _ = session.close();
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match session.poll(PollEvents::Read, Some(shared.config.poll_interval)) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                tracing::warn!(%address, error = %e, "poll failed");
                return;
            }
        }

        match session.read(&mut buf) {
            Ok(0) => {
                let _ = session.close();
                return;
            }
            Ok(n) => {
                tracing::trace!(%address, bytes = n, "received");
                shared.notify(|listener| listener.on_receive(address, &buf[..n]));
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                tracing::warn!(%address, error = %e, "read failed");
                return;
            }
        }
    }
}
