//! Source error types

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the TCP source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Item size or vector length unusable
    #[error("invalid block geometry: {0}")]
    Geometry(String),

    /// Configuration rejected during validation or parsing
    #[error("configuration error: {0}")]
    Config(String),

    /// Host/port could not be turned into candidate endpoints
    #[error("address resolution failed for {target}: {source}")]
    Resolve {
        /// The `host:port` being resolved
        target: String,
        /// Underlying resolver failure
        #[source]
        source: io::Error,
    },

    /// Socket creation failed for a candidate
    #[error("failed to create socket for {addr}: {source}")]
    Socket {
        /// Candidate address
        addr: SocketAddr,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// Binding the listening socket failed
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Candidate address
        addr: SocketAddr,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// Listening on the bound socket failed
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        /// Candidate address
        addr: SocketAddr,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// Every candidate endpoint failed
    #[error("no usable address for {target}")]
    NoUsableAddress {
        /// The `host:port` being resolved
        target: String,
        /// Failure of the last candidate tried
        #[source]
        last: Option<Box<SourceError>>,
    },

    /// One connect attempt failed
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Remote address
        addr: SocketAddr,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// One accept attempt failed
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// Unrecoverable receive failure on the exchange handle
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// Retry budget for establishing a connection exhausted
    #[error("gave up establishing a connection after {attempts} attempts")]
    ConnectGaveUp {
        /// Consecutive failed attempts
        attempts: u32,
    },

    /// Caller buffer cannot hold the demanded bytes
    #[error("output buffer holds {available} bytes, demand needs {required}")]
    BufferTooSmall {
        /// Bytes the demand requires
        required: usize,
        /// Bytes the caller supplied
        available: usize,
    },

    /// Item count times block size does not fit in `usize`
    #[error("demand of {items} items overflows the addressable size")]
    DemandOverflow {
        /// Requested item count
        items: usize,
    },

    /// Connection manager used before `initialize`
    #[error("connection manager not initialized")]
    NotInitialized,

    /// Connection is terminally closed
    #[error("connection closed")]
    Closed,

    /// Shutdown was requested while waiting
    #[error("source shut down")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;
