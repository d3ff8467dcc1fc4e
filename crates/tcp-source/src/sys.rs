//! OS socket layer.
//!
//! Every socket syscall the source makes goes through here, on top of
//! `socket2`, so the connection state machine carries no per-platform code.
//! Process-wide socket subsystem setup (Winsock on Windows) is done once by
//! the standard library on first socket use and never torn down per instance.

use crate::error::{SourceError, SourceResult};
use crate::resolver::Endpoint;
use socket2::Socket;
use std::io;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

/// One exchange connection is expected per source, so the accept queue holds one peer.
pub(crate) const LISTEN_BACKLOG: i32 = 1;

/// Create an unconnected stream socket for `endpoint`.
pub(crate) fn open_stream(endpoint: &Endpoint) -> SourceResult<Socket> {
    Socket::new(endpoint.domain(), endpoint.socket_type(), Some(endpoint.protocol())).map_err(
        |source| SourceError::Socket {
            addr: endpoint.addr(),
            source,
        },
    )
}

/// Create, bind and listen on `endpoint`.
pub(crate) fn listen(endpoint: &Endpoint) -> SourceResult<TcpListener> {
    let socket = open_stream(endpoint)?;

    // SO_REUSEADDR has port-stealing semantics on Windows
    #[cfg(unix)]
    {
        if let Err(e) = socket.set_reuse_address(true) {
            tracing::warn!("Could not set SO_REUSEADDR on {}: {}", endpoint, e);
        }
    }

    socket
        .bind(&endpoint.sock_addr())
        .map_err(|source| SourceError::Bind {
            addr: endpoint.addr(),
            source,
        })?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|source| SourceError::Listen {
            addr: endpoint.addr(),
            source,
        })?;

    Ok(socket.into())
}

/// Connect `socket` to `endpoint`, bounded by `timeout` when given.
pub(crate) fn connect(
    socket: Socket,
    endpoint: &Endpoint,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let addr = endpoint.sock_addr();
    match timeout {
        Some(timeout) => socket.connect_timeout(&addr, timeout)?,
        None => socket.connect(&addr)?,
    }
    Ok(socket.into())
}

/// Put a freshly established exchange handle into blocking mode with the
/// given read timeout (`None` blocks indefinitely).
pub(crate) fn prepare_exchange(stream: &TcpStream, poll_interval: Option<Duration>) -> io::Result<()> {
    // Accepted sockets inherit O_NONBLOCK from the listener on BSD-derived systems
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(poll_interval)
}

/// Whether `err` is the read timeout expiring rather than a network failure.
///
/// Unix reports an expired `SO_RCVTIMEO` as `EAGAIN`; Windows reports
/// `WSAETIMEDOUT`, which is indistinguishable from a transport timeout.
pub(crate) fn is_poll_tick(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::WouldBlock => true,
        io::ErrorKind::TimedOut => cfg!(windows),
        _ => false,
    }
}
