//! Connection identity.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

use crate::error::{Error, Result};

/// Kind of channel behind an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Stream-oriented (TCP client).
    Tcp,

    /// Datagram-oriented (UDP bound port).
    Udp,

    /// In-process channel.
    Memory,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Memory => write!(f, "mem"),
        }
    }
}

/// Address and port of a session, tagged with its transport kind.
///
/// UDP sessions are identified by the wildcard address and their local port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub kind: TransportKind,
    pub addr: SocketAddr,
}

impl Endpoint {
    pub const fn new(kind: TransportKind, addr: SocketAddr) -> Self {
        Self { kind, addr }
    }

    /// Endpoint of a TCP connection to `addr`.
    pub const fn tcp(addr: SocketAddr) -> Self {
        Self::new(TransportKind::Tcp, addr)
    }

    /// Endpoint of a UDP service bound on `port`.
    pub const fn udp(port: u16) -> Self {
        Self::new(
            TransportKind::Udp,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        )
    }

    /// Endpoint of an in-process channel; `port` only distinguishes channels.
    pub const fn memory(port: u16) -> Self {
        Self::new(
            TransportKind::Memory,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
        )
    }

    /// Registry key derived from kind, address and port.
    pub fn id(&self) -> EndpointId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        EndpointId(hasher.finish())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.kind, self.addr)
    }
}

/// Hash of an [`Endpoint`], used as the session registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// What to open: a TCP peer or a local UDP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSpec {
    /// Connect to a TCP server.
    Tcp(SocketAddr),

    /// Bind a UDP port, optionally accepting datagrams from one source only.
    Udp { port: u16, peer: Option<IpAddr> },
}

impl EndpointSpec {
    /// Resolves `host:port` into a TCP spec.
    pub fn tcp(target: &str) -> Result<Self> {
        let addr = target
            .to_socket_addrs()
            .map_err(|e| Error::InvalidAddress(format!("{target}: {e}")))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("{target}: no address")))?;
        Ok(Self::Tcp(addr))
    }

    /// UDP spec accepting any source.
    pub const fn udp(port: u16) -> Self {
        Self::Udp { port, peer: None }
    }

    /// The endpoint a session opened from this spec will carry.
    pub const fn endpoint(&self) -> Endpoint {
        match *self {
            Self::Tcp(addr) => Endpoint::tcp(addr),
            Self::Udp { port, .. } => Endpoint::udp(port),
        }
    }
}
