//! Pull-based block source over a TCP connection

use crate::backoff::Backoff;
use crate::config::SourceConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{SourceError, SourceResult};
use crate::geometry::BlockGeometry;
use crate::receiver::{self, ReceiveOutcome};
use crate::resolver::Role;
use crate::shutdown::ShutdownSignal;
use crate::stats::SourceStats;
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

/// What one `produce` call yielded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Produced {
    /// This many items were written to the output buffer (possibly zero)
    Items(usize),
    /// No more data will ever be produced
    EndOfStream,
}

/// TCP stream source.
///
/// The host engine calls [`produce`](Self::produce) with a demand in items;
/// the source waits for a peer if needed, then fills exactly
/// `items × block_size` bytes or reports why it could not.
///
/// | receive result | server | client |
/// |---|---|---|
/// | completed | `Items(n)` | `Items(n)` |
/// | peer closed / reset / timeout | `Items(0)`, await next peer | `EndOfStream` |
/// | fatal error | `Err(Receive)`, then `EndOfStream` | `Err(Receive)`, then `EndOfStream` |
/// | shutdown requested | `EndOfStream` | `EndOfStream` |
pub struct TcpSource {
    geometry: BlockGeometry,
    connection: ConnectionManager,
    backoff: Backoff,
    shutdown: ShutdownSignal,
    stats: SourceStats,
}

impl TcpSource {
    /// Build a source, failing if the configuration or endpoint is unusable
    pub fn new(config: &SourceConfig) -> SourceResult<Self> {
        Self::with_shutdown(config, ShutdownSignal::new())
    }

    /// Build a source that stops when `shutdown` is triggered
    pub fn with_shutdown(config: &SourceConfig, shutdown: ShutdownSignal) -> SourceResult<Self> {
        config.validate()?;
        let geometry = BlockGeometry::new(config.item_size, config.vector_length)?;

        let mut connection =
            ConnectionManager::new(config.role, config.connection_options(), shutdown.clone());
        connection.initialize(&config.host, &config.port)?;

        info!(
            role = %config.role,
            block_size = geometry.block_size(),
            "TCP source ready"
        );

        Ok(Self {
            geometry,
            connection,
            backoff: Backoff::new(config.backoff_config()),
            shutdown,
            stats: SourceStats::default(),
        })
    }

    /// Fill `out` with `noutput_items` items from the peer.
    ///
    /// `out` must hold at least `noutput_items × block_size` bytes; only that
    /// prefix is written. Bytes of a demand interrupted by a disconnect are
    /// discarded, so item boundaries always line up with the stream start of
    /// each connection.
    pub fn produce(&mut self, noutput_items: usize, out: &mut [u8]) -> SourceResult<Produced> {
        if self.connection.state() == ConnectionState::Closed {
            return Ok(Produced::EndOfStream);
        }

        let demand = self.geometry.demand_bytes(noutput_items)?;
        if out.len() < demand {
            return Err(SourceError::BufferTooSmall {
                required: demand,
                available: out.len(),
            });
        }
        if noutput_items == 0 {
            return Ok(Produced::Items(0));
        }

        match self.wait_for_peer() {
            Ok(()) => {}
            Err(SourceError::Cancelled) => return Ok(self.stop()),
            Err(e) => return Err(e),
        }

        let stream = self.connection.exchange_mut().ok_or(SourceError::Closed)?;
        let outcome = receiver::receive(stream, &mut out[..demand], &self.shutdown);
        self.settle(noutput_items, outcome)
    }

    /// Apply the role policy to the result of one receive
    fn settle(&mut self, noutput_items: usize, outcome: ReceiveOutcome) -> SourceResult<Produced> {
        match outcome {
            ReceiveOutcome::Completed(bytes) => {
                self.stats.bytes_received += bytes as u64;
                self.stats.items_produced += noutput_items as u64;
                debug!("Produced {} items ({} bytes)", noutput_items, bytes);
                Ok(Produced::Items(noutput_items))
            }
            ReceiveOutcome::PeerClosed { received } => {
                self.count_discarded(received);
                self.stats.peer_closures += 1;
                match self.connection.role() {
                    Role::Server => info!(
                        "Client has closed the connection and no more data remains. \
                         Waiting for new connection."
                    ),
                    Role::Client => {
                        warn!("Server has closed the connection and no more data remains.")
                    }
                }
                Ok(self.peer_lost())
            }
            ReceiveOutcome::Recoverable { error, received } => {
                self.count_discarded(received);
                self.stats.recoverable_errors += 1;
                warn!("Connection has been shut down: {}", error);
                Ok(self.peer_lost())
            }
            ReceiveOutcome::Fatal { error, received } => {
                self.count_discarded(received);
                self.stats.fatal_errors += 1;
                error!("Error encountered while attempting to receive data: {}", error);
                self.connection.close();
                Err(SourceError::Receive(error))
            }
            ReceiveOutcome::Cancelled { received } => {
                self.count_discarded(received);
                Ok(self.stop())
            }
        }
    }

    /// Handle that makes blocked or future `produce` calls end the stream
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Connection state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Fixed role
    pub fn role(&self) -> Role {
        self.connection.role()
    }

    /// Block geometry
    pub fn geometry(&self) -> BlockGeometry {
        self.geometry
    }

    /// Bound address of the listening handle (server role)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connection.local_addr()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }

    /// Call `establish` until connected, pacing failures with backoff
    fn wait_for_peer(&mut self) -> SourceResult<()> {
        while self.connection.state() != ConnectionState::Connected {
            match self.connection.establish() {
                Ok(()) => {
                    self.backoff.reset();
                    self.stats.connections += 1;
                }
                Err(e @ (SourceError::Cancelled | SourceError::Closed | SourceError::NotInitialized)) => {
                    return Err(e)
                }
                Err(e) => {
                    if matches!(e, SourceError::Accept(_)) {
                        self.stats.accept_failures += 1;
                    } else {
                        self.stats.connect_failures += 1;
                    }

                    let Some(delay) = self.backoff.next_delay() else {
                        let attempts = self.backoff.attempts();
                        error!("Giving up after {} failed attempts", attempts);
                        self.connection.close();
                        return Err(SourceError::ConnectGaveUp { attempts });
                    };
                    debug!("Retrying in {:?}", delay);
                    if self.shutdown.wait_timeout(delay) {
                        return Err(SourceError::Cancelled);
                    }
                }
            }
        }
        Ok(())
    }

    fn peer_lost(&mut self) -> Produced {
        self.connection.on_peer_closed_or_fatal();
        match self.connection.state() {
            ConnectionState::Closed => Produced::EndOfStream,
            _ => Produced::Items(0),
        }
    }

    fn stop(&mut self) -> Produced {
        info!("Shutdown requested, ending stream");
        self.connection.close();
        Produced::EndOfStream
    }

    fn count_discarded(&mut self, bytes: usize) {
        self.stats.bytes_received += bytes as u64;
        self.stats.bytes_discarded += bytes as u64;
    }
}

impl std::fmt::Debug for TcpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSource")
            .field("geometry", &self.geometry)
            .field("connection", &self.connection)
            .field("stats", &self.stats)
            .finish()
    }
}
