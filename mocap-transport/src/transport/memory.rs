//! In-process transport, for tests and for embedding a stream source.

use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, Sender};

use super::{connection_lost, Interrupter, Transport};
use crate::core::Endpoint;
use crate::error::Result;

/// Transport whose bytes are pushed by a [`MemoryFeeder`].
///
/// Chunks are delivered exactly as fed, split only when the receive buffer
/// is smaller than the chunk. Dropping every feeder ends the stream.
#[derive(Debug)]
pub struct MemoryTransport {
    endpoint: Endpoint,
    data_rx: Receiver<Vec<u8>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    poll_interval: Duration,
    pending: Vec<u8>,
    pending_pos: usize,
    closed: bool,
}

/// Sending half of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryFeeder {
    data_tx: Sender<Vec<u8>>,
}

impl MemoryFeeder {
    /// Queues a chunk. Returns false once the transport is gone.
    pub fn feed(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.data_tx.send(bytes.into()).is_ok()
    }
}

impl MemoryTransport {
    /// Creates a connected transport/feeder pair.
    pub fn pair(endpoint: Endpoint, poll_interval: Duration) -> (Self, MemoryFeeder) {
        let (data_tx, data_rx) = unbounded();
        let (wake_tx, wake_rx) = unbounded();
        let transport = Self {
            endpoint,
            data_rx,
            wake_tx,
            wake_rx,
            poll_interval,
            pending: Vec::new(),
            pending_pos: 0,
            closed: false,
        };
        (transport, MemoryFeeder { data_tx })
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = (self.pending.len() - self.pending_pos).min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;
        if self.pending_pos == self.pending.len() {
            self.pending.clear();
            self.pending_pos = 0;
        }
        n
    }
}

impl Transport for MemoryTransport {
    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(connection_lost(self.endpoint, "transport disconnected"));
        }
        if !self.pending.is_empty() {
            return Ok(self.take_pending(buf));
        }

        let chunk = select! {
            recv(self.data_rx) -> msg => match msg {
                Ok(chunk) => chunk,
                Err(_) => return Err(connection_lost(self.endpoint, "feeder dropped")),
            },
            recv(self.wake_rx) -> _ => return Ok(0),
            default(self.poll_interval) => return Ok(0),
        };

        self.pending = chunk;
        self.pending_pos = 0;
        Ok(self.take_pending(buf))
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let wake_tx = self.wake_tx.clone();
        Some(Box::new(move || {
            let _ = wake_tx.send(());
        }))
    }

    fn disconnect(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}
