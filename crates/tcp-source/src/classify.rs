//! Receive error classification

use std::io;

/// How a failed receive affects the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The peer is gone but a new one may be awaited
    Recoverable,
    /// The stream cannot continue
    Fatal,
}

/// Classify an I/O failure from the exchange handle.
///
/// Connection resets and timeouts are recoverable; everything else is fatal.
/// The mapping does not depend on the role.
pub fn classify(err: &io::Error) -> ErrorClass {
    classify_kind(err.kind())
}

/// Classify a raw OS error code (`errno` / `WSAGetLastError`).
pub fn classify_raw(code: i32) -> ErrorClass {
    classify_kind(io::Error::from_raw_os_error(code).kind())
}

fn classify_kind(kind: io::ErrorKind) -> ErrorClass {
    match kind {
        io::ErrorKind::ConnectionReset | io::ErrorKind::TimedOut => ErrorClass::Recoverable,
        _ => ErrorClass::Fatal,
    }
}
