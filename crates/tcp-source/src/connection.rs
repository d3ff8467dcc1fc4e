//! Connection lifecycle for one active peer

use crate::error::{SourceError, SourceResult};
use crate::resolver::{self, Endpoint, Role};
use crate::shutdown::ShutdownSignal;
use crate::sys;
use socket2::Socket;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tracing::{debug, error, info};

/// Upper bound on the wait between nonblocking accept attempts
const MAX_ACCEPT_TICK: Duration = Duration::from_millis(10);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet initialized
    Idle,
    /// Ready to connect (client) or accept (server)
    AwaitingPeer,
    /// Exchange handle open
    Connected,
    /// Terminal; no further connections
    Closed,
}

/// Socket timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Read timeout on the exchange handle, and the longest a blocked call
    /// goes without noticing shutdown. `None` blocks indefinitely.
    ///
    /// Accept polling uses the shorter of this and 10 ms, so a new peer is
    /// picked up within that tick.
    pub poll_interval: Option<Duration>,
    /// Per-attempt connect timeout. `None` leaves it to the OS.
    pub connect_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Some(Duration::from_millis(200)),
            connect_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Owns the listening and exchange handles and the connection state machine.
///
/// ```text
/// Idle -> AwaitingPeer -> Connected -> AwaitingPeer   (server)
///                                   -> Closed         (client)
/// ```
///
/// At most one exchange handle is open at a time. A server's listening
/// handle is created once by [`initialize`](Self::initialize) and lives until
/// the manager is dropped.
pub struct ConnectionManager {
    role: Role,
    options: ConnectionOptions,
    shutdown: ShutdownSignal,
    state: ConnectionState,
    endpoint: Option<Endpoint>,
    listener: Option<TcpListener>,
    /// Client socket created while probing candidates, consumed by the first connect
    pending: Option<Socket>,
    exchange: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl ConnectionManager {
    /// Create an idle manager
    pub fn new(role: Role, options: ConnectionOptions, shutdown: ShutdownSignal) -> Self {
        Self {
            role,
            options,
            shutdown,
            state: ConnectionState::Idle,
            endpoint: None,
            listener: None,
            pending: None,
            exchange: None,
            peer: None,
        }
    }

    /// Resolve `host`/`port` and prepare the chosen endpoint
    pub fn initialize(&mut self, host: &str, port: &str) -> SourceResult<()> {
        let target = resolver::target(host, port, self.role);
        let candidates = resolver::resolve(host, port, self.role)?;
        self.initialize_with(&target, &candidates)
    }

    /// Prepare the first usable endpoint out of `candidates`.
    ///
    /// Servers bind and listen here, once. Clients only create a socket; the
    /// connect happens in [`establish`](Self::establish).
    pub fn initialize_with(&mut self, target: &str, candidates: &[Endpoint]) -> SourceResult<()> {
        if self.state != ConnectionState::Idle {
            return Err(SourceError::Config(
                "connection manager already initialized".into(),
            ));
        }

        let endpoint = match self.role {
            Role::Server => {
                let (endpoint, listener) = resolver::select(target, candidates, sys::listen)?;
                if self.options.poll_interval.is_some() {
                    listener.set_nonblocking(true)?;
                }
                info!("Listening on {}", listener.local_addr()?);
                self.listener = Some(listener);
                endpoint
            }
            Role::Client => {
                let (endpoint, socket) = resolver::select(target, candidates, sys::open_stream)?;
                self.pending = Some(socket);
                endpoint
            }
        };

        info!("Successfully initialized {} socket for {}", self.role, endpoint);
        self.endpoint = Some(endpoint);
        self.state = ConnectionState::AwaitingPeer;
        Ok(())
    }

    /// Make one attempt to obtain an exchange handle.
    ///
    /// Clients issue a single connect; servers block in accept until a peer
    /// arrives or shutdown is requested. A failed attempt is logged and
    /// leaves the state unchanged so the caller can retry.
    pub fn establish(&mut self) -> SourceResult<()> {
        match self.state {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Closed => return Err(SourceError::Closed),
            ConnectionState::Idle => return Err(SourceError::NotInitialized),
            ConnectionState::AwaitingPeer => {}
        }
        if self.shutdown.is_triggered() {
            return Err(SourceError::Cancelled);
        }

        let attempt = match self.role {
            Role::Client => self.connect(),
            Role::Server => self.accept(),
        };
        let (stream, peer) = match attempt {
            Ok(connected) => connected,
            Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        };

        if let Err(e) = sys::prepare_exchange(&stream, self.options.poll_interval) {
            error!("Could not configure connection with {}: {}", peer, e);
            return Err(e.into());
        }

        match self.role {
            Role::Client => info!("Successfully connected to server {}", peer),
            Role::Server => info!("Successfully connected to client {}", peer),
        }
        self.exchange = Some(stream);
        self.peer = Some(peer);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Release the exchange handle after the peer went away.
    ///
    /// Servers go back to awaiting a peer on the same listening handle;
    /// clients close for good.
    pub fn on_peer_closed_or_fatal(&mut self) {
        self.release_exchange();
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = match self.role {
            Role::Server => ConnectionState::AwaitingPeer,
            Role::Client => ConnectionState::Closed,
        };
    }

    /// Release the exchange handle and stop accepting or connecting
    pub fn close(&mut self) {
        self.release_exchange();
        self.pending = None;
        self.state = ConnectionState::Closed;
    }

    /// Exchange handle while connected
    pub fn exchange_mut(&mut self) -> Option<&mut TcpStream> {
        self.exchange.as_mut()
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Fixed role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Endpoint chosen during initialization
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint
    }

    /// Address the listening handle is bound to (server role)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Address of the current peer
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn connect(&mut self) -> SourceResult<(TcpStream, SocketAddr)> {
        let endpoint = self.endpoint.ok_or(SourceError::NotInitialized)?;
        // A socket whose connect failed is not reused
        let socket = match self.pending.take() {
            Some(socket) => socket,
            None => sys::open_stream(&endpoint)?,
        };
        debug!("Connecting to {}", endpoint);
        let stream = sys::connect(socket, &endpoint, self.options.connect_timeout).map_err(
            |source| SourceError::Connect {
                addr: endpoint.addr(),
                source,
            },
        )?;
        Ok((stream, endpoint.addr()))
    }

    fn accept(&mut self) -> SourceResult<(TcpStream, SocketAddr)> {
        let listener = self.listener.as_ref().ok_or(SourceError::NotInitialized)?;
        loop {
            match listener.accept() {
                Ok(accepted) => return Ok(accepted),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if self.shutdown.wait_timeout(self.accept_tick()) {
                        return Err(SourceError::Cancelled);
                    }
                }
                Err(e) => return Err(SourceError::Accept(e)),
            }
        }
    }

    fn accept_tick(&self) -> Duration {
        self.options
            .poll_interval
            .map_or(MAX_ACCEPT_TICK, |poll| poll.min(MAX_ACCEPT_TICK))
    }

    fn release_exchange(&mut self) {
        if let Some(stream) = self.exchange.take() {
            // ENOTCONN is expected once the peer has reset
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("Shutdown of exchange handle failed: {}", e);
            }
            debug!(
                "Released exchange handle{}",
                self.peer
                    .take()
                    .map(|p| format!(" for {}", p))
                    .unwrap_or_default()
            );
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.release_exchange();
        if let Some(listener) = self.listener.take() {
            debug!(
                "Released listening handle{}",
                listener
                    .local_addr()
                    .map(|a| format!(" on {}", a))
                    .unwrap_or_default()
            );
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("endpoint", &self.endpoint)
            .field("peer", &self.peer)
            .finish()
    }
}
