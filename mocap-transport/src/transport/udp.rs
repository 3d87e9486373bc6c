use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use super::{connection_lost, is_poll_timeout, Interrupter, Transport};
use crate::config::SessionConfig;
use crate::core::Endpoint;
use crate::error::{Error, Result};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Datagram-oriented transport bound to a local port.
///
/// When a peer address is given, datagrams from any other source are
/// dropped and reported as zero bytes received.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    endpoint: Endpoint,
    local_addr: SocketAddr,
    peer: Option<IpAddr>,
}

impl UdpTransport {
    /// Binds `0.0.0.0:port`. Port 0 picks an ephemeral port.
    pub fn bind(port: u16, peer: Option<IpAddr>, config: &SessionConfig) -> Result<Self> {
        let requested = Endpoint::udp(port);
        let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
            .map_err(|source| Error::ConnectFailed {
                endpoint: requested,
                source,
            })?;
        socket.set_read_timeout(Some(config.poll_interval))?;

        let local_addr = socket.local_addr()?;
        let endpoint = Endpoint::udp(local_addr.port());
        let peer = peer.filter(|ip| !ip.is_unspecified());

        match peer {
            Some(ip) => log::info!("UDP service bound on {endpoint}, accepting {ip} only"),
            None => log::info!("UDP service bound on {endpoint}"),
        }

        Ok(Self {
            socket: Some(socket),
            endpoint,
            local_addr,
            peer,
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Source filter, if any.
    pub fn peer(&self) -> Option<IpAddr> {
        self.peer
    }
}

impl Transport for UdpTransport {
    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(connection_lost(self.endpoint, "transport disconnected"));
        };

        match socket.recv_from(buf) {
            Ok((n, src)) => match self.peer {
                Some(peer) if src.ip() != peer => {
                    log::trace!("Dropped {n} bytes from unexpected source {src}");
                    Ok(0)
                }
                _ => Ok(n),
            },
            Err(e) if is_poll_timeout(&e) => Ok(0),
            // ICMP unreachable from an earlier send; not fatal for a receiver
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused) => {
                log::warn!("UDP receive on {} reported {e}", self.endpoint);
                Ok(0)
            }
            Err(e) => Err(connection_lost(self.endpoint, e.to_string())),
        }
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let socket = self.socket.as_ref()?.try_clone().ok()?;
        let wake = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.local_addr.port());
        Some(Box::new(move || {
            let _ = socket.send_to(&[], wake);
        }))
    }

    fn max_message_size(&self) -> Option<usize> {
        Some(MAX_DATAGRAM_SIZE)
    }

    fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            log::debug!("Closed UDP service {}", self.endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> SessionConfig {
        SessionConfig::new().with_poll_interval(Duration::from_millis(20))
    }

    fn receive_nonzero(transport: &mut UdpTransport, buf: &mut [u8]) -> usize {
        for _ in 0..100 {
            let n = transport.receive(buf).unwrap();
            if n > 0 {
                return n;
            }
        }
        0
    }

    #[test]
    fn test_receive_datagram() {
        let mut transport = UdpTransport::bind(0, None, &config()).unwrap();
        let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), transport.local_addr().port());

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"hello", target).unwrap();

        let mut buf = [0u8; 64];
        let n = receive_nonzero(&mut transport, &mut buf);
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn test_source_filter() {
        let peer: IpAddr = "10.255.255.1".parse().unwrap();
        let mut transport = UdpTransport::bind(0, Some(peer), &config()).unwrap();
        let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), transport.local_addr().port());

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"spoofed", target).unwrap();

        let mut buf = [0u8; 64];
        for _ in 0..5 {
            assert_eq!(transport.receive(&mut buf).unwrap(), 0);
        }
    }

    #[test]
    fn test_unspecified_peer_accepts_all() {
        let transport = UdpTransport::bind(0, Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)), &config()).unwrap();
        assert_eq!(transport.peer(), None);
        assert_eq!(transport.endpoint(), Endpoint::udp(transport.local_addr().port()));
    }

    #[test]
    fn test_reports_datagram_limit() {
        let transport = UdpTransport::bind(0, None, &config()).unwrap();
        assert_eq!(transport.max_message_size(), Some(MAX_DATAGRAM_SIZE));
    }

    #[test]
    fn test_bind_conflict_is_connect_failed() {
        let first = UdpTransport::bind(0, None, &config()).unwrap();
        let port = first.local_addr().port();
        assert!(matches!(
            UdpTransport::bind(port, None, &config()),
            Err(Error::ConnectFailed { .. })
        ));
    }
}
