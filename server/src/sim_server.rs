use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::*;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::{interval, MissedTickBehavior};

use crate::motion::MotionGenerator;

#[derive(Debug, Clone)]
pub enum ServerTarget {
    /// Listen on this address and stream to every client that connects.
    Tcp(SocketAddr),
    /// Send one datagram per frame to this address.
    Udp(SocketAddr),
}

/// Streams synthetic motion data at a fixed frame rate.
pub struct SimServer {
    target: ServerTarget,
    generator: MotionGenerator,
    period: Duration,
}

impl SimServer {
    pub fn new(target: ServerTarget, generator: MotionGenerator, rate_hz: u32) -> Self {
        Self {
            target,
            generator,
            period: Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1))),
        }
    }

    pub async fn run(&self) -> io::Result<()> {
        match &self.target {
            ServerTarget::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!("Server listening on TCP {}", listener.local_addr()?);
                loop {
                    let (stream, peer) = listener.accept().await?;
                    info!("Accepted TCP connection from {peer}");
                    tokio::spawn(Self::handle_connection(stream, peer, self.generator.clone(), self.period));
                }
            }
            ServerTarget::Udp(target) => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                info!("Sending UDP datagrams from {} to {target}", socket.local_addr()?);
                self.send_datagrams(socket, *target).await
            }
        }
    }

    /// Streams frames to one TCP client until it goes away.
    async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, mut generator: MotionGenerator, period: Duration) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("[{peer}] set_nodelay failed: {e}");
        }

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = Vec::new();
        let mut sent: u64 = 0;

        loop {
            ticker.tick().await;
            let frames = match generator.encode_tick(&mut buf) {
                Ok(frames) => frames,
                Err(e) => {
                    error!("[{peer}] {e}");
                    break;
                }
            };
            if let Err(e) = stream.write_all(&buf).await {
                info!("[{peer}] Client disconnected: {e}");
                break;
            }
            sent += frames as u64;
            if generator.frame_index() % 600 == 0 {
                debug!("[{peer}] {sent} frames sent");
            }
        }

        info!("[{peer}] Connection handler exiting after {sent} frames");
    }

    async fn send_datagrams(&self, socket: UdpSocket, target: SocketAddr) -> io::Result<()> {
        let mut generator = self.generator.clone();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = Vec::new();

        loop {
            ticker.tick().await;
            for frame in generator.next_frames() {
                buf.clear();
                frame
                    .encode_into(&mut buf)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                match socket.send_to(&buf, target).await {
                    Ok(_) => {}
                    // Nobody listening yet; keep streaming.
                    Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                        trace!("Datagram to {target} refused");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
}
