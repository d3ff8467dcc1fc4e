//! Per-source counters

use serde::Serialize;

/// Counters describing what a source has done so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    /// Raw bytes read from peers, including discarded partial blocks
    pub bytes_received: u64,
    /// Bytes of incomplete demands dropped when a peer went away
    pub bytes_discarded: u64,
    /// Items delivered to the host
    pub items_produced: u64,
    /// Connections established
    pub connections: u64,
    /// Failed connect attempts
    pub connect_failures: u64,
    /// Failed accept attempts
    pub accept_failures: u64,
    /// Orderly peer shutdowns
    pub peer_closures: u64,
    /// Resets and timeouts
    pub recoverable_errors: u64,
    /// Unclassified receive failures
    pub fatal_errors: u64,
}

impl SourceStats {
    /// Disconnects of any kind
    pub fn disconnects(&self) -> u64 {
        self.peer_closures + self.recoverable_errors + self.fatal_errors
    }
}
