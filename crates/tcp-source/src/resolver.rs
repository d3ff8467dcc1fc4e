//! Endpoint resolution and first-viable candidate selection

use crate::error::{SourceError, SourceResult};
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, SockAddr, Type};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Whether the source dials out or waits for peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Connect to a remote listener
    Client,
    /// Accept connections on a local port
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

impl FromStr for Role {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "server" => Ok(Role::Server),
            other => Err(SourceError::Config(format!("unknown role {:?}", other))),
        }
    }
}

/// A resolved address together with the socket parameters needed to use it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: SocketAddr,
}

impl Endpoint {
    /// Wrap a socket address
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// The socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address family
    pub fn domain(&self) -> Domain {
        Domain::for_address(self.addr)
    }

    /// Socket type; always a byte stream
    pub fn socket_type(&self) -> Type {
        Type::STREAM
    }

    /// Transport protocol; always TCP
    pub fn protocol(&self) -> Protocol {
        Protocol::TCP
    }

    /// Address in the form the OS socket calls take
    pub fn sock_addr(&self) -> SockAddr {
        SockAddr::from(self.addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

/// Human-readable resolution target used in logs and errors
pub fn target(host: &str, port: &str, role: Role) -> String {
    match role {
        Role::Client => format!("{}:{}", host, port),
        Role::Server => format!("*:{}", port),
    }
}

/// Resolve `host`/`port` into candidate endpoints in resolver order.
///
/// Clients resolve the remote host (literal or name, either family). Servers
/// ignore `host` and get the IPv4 and IPv6 wildcard addresses for the port.
pub fn resolve(host: &str, port: &str, role: Role) -> SourceResult<Vec<Endpoint>> {
    let target = target(host, port, role);
    let port = parse_port(port).map_err(|source| SourceError::Resolve {
        target: target.clone(),
        source,
    })?;

    let candidates: Vec<Endpoint> = match role {
        Role::Server => {
            if !host.trim().is_empty() {
                debug!("Server role ignores host {:?}, binding wildcard", host);
            }
            vec![
                Endpoint::new(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port)),
                Endpoint::new(SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), port)),
            ]
        }
        Role::Client => {
            let host = host.trim().trim_start_matches('[').trim_end_matches(']');
            (host, port)
                .to_socket_addrs()
                .map_err(|source| SourceError::Resolve {
                    target: target.clone(),
                    source,
                })?
                .map(Endpoint::new)
                .collect()
        }
    };

    if candidates.is_empty() {
        return Err(SourceError::Resolve {
            target,
            source: io::Error::new(io::ErrorKind::NotFound, "resolver returned no addresses"),
        });
    }

    debug!("Resolved {} to {} candidate(s)", target, candidates.len());
    Ok(candidates)
}

/// Try `probe` on each candidate in order and keep the first that succeeds.
///
/// Failures are logged and the last one is attached to the
/// [`SourceError::NoUsableAddress`] returned when nothing works.
pub fn select<T, F>(target: &str, candidates: &[Endpoint], mut probe: F) -> SourceResult<(Endpoint, T)>
where
    F: FnMut(&Endpoint) -> SourceResult<T>,
{
    info!("Trying to find a usable address for {}", target);
    let mut last = None;
    for endpoint in candidates {
        match probe(endpoint) {
            Ok(value) => {
                info!("Using address {}", endpoint);
                return Ok((*endpoint, value));
            }
            Err(e) => {
                warn!("Candidate {} unusable: {}", endpoint, e);
                last = Some(Box::new(e));
            }
        }
    }

    Err(SourceError::NoUsableAddress {
        target: target.to_string(),
        last,
    })
}

fn parse_port(port: &str) -> io::Result<u16> {
    port.trim().parse::<u16>().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid port {:?}", port),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(s: &str) -> Endpoint {
        Endpoint::new(s.parse().unwrap())
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("client".parse::<Role>().unwrap(), Role::Client);
        assert_eq!(" SERVER ".parse::<Role>().unwrap(), Role::Server);
        assert!("listener".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Client.to_string(), "client");
        assert_eq!(Role::Server.to_string(), "server");
    }

    #[test]
    fn test_endpoint_domain() {
        assert_eq!(ep("127.0.0.1:1").domain(), Domain::IPV4);
        assert_eq!(ep("[::1]:1").domain(), Domain::IPV6);
        assert_eq!(ep("127.0.0.1:1").socket_type(), Type::STREAM);
    }

    #[test]
    fn test_resolve_client_ipv4_literal() {
        let candidates = resolve("127.0.0.1", "9999", Role::Client).unwrap();
        assert_eq!(candidates, vec![ep("127.0.0.1:9999")]);
    }

    #[test]
    fn test_resolve_client_ipv6_literal() {
        let candidates = resolve("::1", "9999", Role::Client).unwrap();
        assert_eq!(candidates, vec![ep("[::1]:9999")]);

        let bracketed = resolve("[::1]", "9999", Role::Client).unwrap();
        assert_eq!(bracketed, candidates);
    }

    #[test]
    fn test_resolve_client_hostname() {
        let candidates = resolve("localhost", "80", Role::Client).unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.addr().ip().is_loopback()));
    }

    #[test]
    fn test_resolve_server_wildcards() {
        let candidates = resolve("ignored.example", "9999", Role::Server).unwrap();
        assert_eq!(candidates, vec![ep("0.0.0.0:9999"), ep("[::]:9999")]);
    }

    #[test]
    fn test_resolve_invalid_port() {
        let err = resolve("127.0.0.1", "http-alt", Role::Client).unwrap_err();
        assert!(matches!(err, SourceError::Resolve { .. }));
        let err = resolve("", "70000", Role::Server).unwrap_err();
        assert!(matches!(err, SourceError::Resolve { .. }));
    }

    #[test]
    fn test_select_first_viable() {
        let candidates = vec![ep("10.0.0.1:1"), ep("10.0.0.2:1"), ep("10.0.0.3:1")];
        let mut tried = Vec::new();
        let (chosen, value) = select("t", &candidates, |endpoint| {
            tried.push(endpoint.addr());
            if endpoint.addr().ip().to_string() == "10.0.0.1" {
                Err(SourceError::Bind {
                    addr: endpoint.addr(),
                    source: io::Error::from(io::ErrorKind::AddrInUse),
                })
            } else {
                Ok(7)
            }
        })
        .unwrap();

        assert_eq!(chosen, ep("10.0.0.2:1"));
        assert_eq!(value, 7);
        // Stops at the first success
        assert_eq!(tried.len(), 2);
    }

    #[test]
    fn test_select_is_deterministic() {
        let candidates = vec![ep("10.0.0.1:1"), ep("10.0.0.2:1"), ep("10.0.0.3:1")];
        let script = [false, true, true];
        for _ in 0..5 {
            let mut index = 0;
            let (chosen, _) = select("t", &candidates, |endpoint| {
                let ok = script[index];
                index += 1;
                if ok {
                    Ok(())
                } else {
                    Err(SourceError::Socket {
                        addr: endpoint.addr(),
                        source: io::Error::from(io::ErrorKind::Unsupported),
                    })
                }
            })
            .unwrap();
            assert_eq!(chosen, ep("10.0.0.2:1"));
        }
    }

    #[test]
    fn test_select_none_viable() {
        let candidates = vec![ep("10.0.0.1:1"), ep("10.0.0.2:1")];
        let err = select::<(), _>("*:1", &candidates, |endpoint| {
            Err(SourceError::Listen {
                addr: endpoint.addr(),
                source: io::Error::from(io::ErrorKind::Other),
            })
        })
        .unwrap_err();

        match err {
            SourceError::NoUsableAddress { target, last } => {
                assert_eq!(target, "*:1");
                match last.as_deref() {
                    Some(SourceError::Listen { addr, .. }) => {
                        assert_eq!(*addr, "10.0.0.2:1".parse::<SocketAddr>().unwrap())
                    }
                    other => panic!("unexpected last error: {:?}", other),
                }
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_select_empty_candidates() {
        let err = select::<(), _>("t", &[], |_| Ok(())).unwrap_err();
        assert!(matches!(err, SourceError::NoUsableAddress { last: None, .. }));
    }
}
