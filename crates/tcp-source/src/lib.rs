//! # tcp-source
//!
//! Block-oriented TCP stream source for pull-based dataflow engines.
//!
//! This crate provides:
//! - Client (connect) and server (listen/accept) roles over IPv4 or IPv6
//! - Exact-demand receive that never yields partial items
//! - Server re-accept after a peer leaves, client end-of-stream
//! - Backoff-paced connection retries and cooperative shutdown
//!
//! ## Architecture
//!
//! ```text
//! +---------------------+
//! |      TcpSource      |  <- produce(n, out)
//! +---------------------+
//!      |           |
//! +-----------+ +----------+
//! | Connection| | receive  |  <- state machine / fill loop
//! |  Manager  | +----------+
//! +-----------+      |
//!      |        +----------+
//! +-----------+ | classify |  <- recoverable vs fatal
//! |  resolver | +----------+
//! +-----------+
//!      |
//! +-----------+
//! |    sys    |  <- socket2
//! +-----------+
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use tcp_source::{Produced, Role, SourceConfig, TcpSource};
//!
//! let config = SourceConfig::new(4, 1, "", 9999, Role::Server);
//! let mut source = TcpSource::new(&config)?;
//!
//! let mut out = vec![0u8; 64 * 4];
//! loop {
//!     match source.produce(64, &mut out)? {
//!         Produced::Items(n) => { /* consume out[..n * 4] */ }
//!         Produced::EndOfStream => break,
//!     }
//! }
//! # Ok::<(), tcp_source::SourceError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod backoff;
mod classify;
mod config;
mod connection;
mod error;
mod geometry;
mod receiver;
mod resolver;
mod shutdown;
mod source;
mod stats;
mod sys;

pub use backoff::{Backoff, BackoffConfig};
pub use classify::{classify, classify_raw, ErrorClass};
pub use config::{BackoffSettings, SourceConfig};
pub use connection::{ConnectionManager, ConnectionOptions, ConnectionState};
pub use error::{SourceError, SourceResult};
pub use geometry::BlockGeometry;
pub use receiver::{receive, ReceiveOutcome};
pub use resolver::{resolve, select, Endpoint, Role};
pub use shutdown::ShutdownSignal;
pub use source::{Produced, TcpSource};
pub use stats::SourceStats;
