use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpStream};

use super::{connection_lost, is_poll_timeout, Interrupter, Transport};
use crate::config::SessionConfig;
use crate::core::Endpoint;
use crate::error::{Error, Result};

/// Stream-oriented transport over a TCP client connection.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    endpoint: Endpoint,
}

impl TcpTransport {
    /// Connects to `addr`, waiting at most `config.connect_timeout`.
    pub fn connect(addr: SocketAddr, config: &SessionConfig) -> Result<Self> {
        let endpoint = Endpoint::tcp(addr);
        log::debug!("Connecting to {endpoint}...");

        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)
            .map_err(|source| Error::ConnectFailed { endpoint, source })?;

        let transport = Self::from_stream(stream, endpoint, config)?;
        log::info!("Connected to {endpoint}");
        Ok(transport)
    }

    /// Adopts an already connected stream.
    pub fn from_stream(stream: TcpStream, endpoint: Endpoint, config: &SessionConfig) -> Result<Self> {
        stream.set_read_timeout(Some(config.poll_interval))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: Some(stream),
            endpoint,
        })
    }
}

impl Transport for TcpTransport {
    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(connection_lost(self.endpoint, "transport disconnected"));
        };

        match stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(connection_lost(self.endpoint, "closed by peer")),
            Ok(n) => Ok(n),
            Err(e) if is_poll_timeout(&e) => Ok(0),
            Err(e) => Err(connection_lost(self.endpoint, e.to_string())),
        }
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let clone = self.stream.as_ref()?.try_clone().ok()?;
        Some(Box::new(move || {
            let _ = clone.shutdown(Shutdown::Both);
        }))
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            log::debug!("Disconnected from {}", self.endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::time::Duration;

    fn config() -> SessionConfig {
        SessionConfig::new().with_poll_interval(Duration::from_millis(20))
    }

    #[test]
    fn test_receive_and_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = TcpTransport::connect(addr, &config()).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        let mut buf = [0u8; 16];
        // nothing sent yet: poll timeout is not an error
        assert_eq!(transport.receive(&mut buf).unwrap(), 0);

        peer.write_all(b"abc").unwrap();
        let mut got = 0;
        while got == 0 {
            got = transport.receive(&mut buf).unwrap();
        }
        assert_eq!(&buf[..got], b"abc");

        drop(peer);
        let err = loop {
            match transport.receive(&mut buf) {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, Error::ConnectionLost { .. }));
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpTransport::connect(addr, &config());
        assert!(matches!(result, Err(Error::ConnectFailed { .. })));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut transport = TcpTransport::connect(addr, &config()).unwrap();

        transport.disconnect();
        transport.disconnect();
        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.receive(&mut buf),
            Err(Error::ConnectionLost { .. })
        ));
    }
}
