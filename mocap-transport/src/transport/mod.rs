//! Transport layer abstraction.
//!
//! This module provides the `Transport` trait that a session drives from its
//! receive loop. A transport only moves bytes; framing is the session's job.
//!
//! # Implementations
//!
//! - `TcpTransport`: Stream-oriented client connection
//! - `UdpTransport`: Datagram-oriented bound port with optional source filter
//! - `MemoryTransport`: In-process channel, fed through a `MemoryFeeder`
//!
//! # Example
//!
//! ```rust,ignore
//! use mocap_transport::transport::{Transport, TcpTransport};
//! use mocap_transport::SessionConfig;
//!
//! let mut transport = TcpTransport::connect("127.0.0.1:7003".parse()?, &SessionConfig::default())?;
//!
//! let mut buf = [0u8; 1504];
//! let n = transport.receive(&mut buf)?;
//! ```

mod memory;
mod tcp;
mod udp;

pub use memory::{MemoryFeeder, MemoryTransport};
pub use tcp::TcpTransport;
pub use udp::{UdpTransport, MAX_DATAGRAM_SIZE};

use crate::core::Endpoint;
use crate::error::{Error, Result};

/// Handle that wakes a receive blocked on another thread.
pub type Interrupter = Box<dyn Fn() + Send + Sync>;

/// Byte source driven by a session worker.
pub trait Transport: Send + 'static {
    /// Identity of the channel.
    fn endpoint(&self) -> Endpoint;

    /// Blocks until bytes arrive or the poll interval elapses.
    ///
    /// Returns `Ok(0)` when nothing usable arrived this round (timeout,
    /// filtered datagram, interruption). A terminated connection is reported
    /// as `Error::ConnectionLost` and is not retried.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Returns a handle that makes a pending `receive` return early.
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }

    /// Largest message a message-oriented transport can deliver.
    ///
    /// `None` for byte streams. When set, each `receive` returns one whole
    /// message and packets never continue across messages.
    fn max_message_size(&self) -> Option<usize> {
        None
    }

    /// Closes the channel. Called once the receive loop has stopped;
    /// calling it again is a no-op.
    fn disconnect(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn endpoint(&self) -> Endpoint {
        (**self).endpoint()
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).receive(buf)
    }

    fn interrupter(&self) -> Option<Interrupter> {
        (**self).interrupter()
    }

    fn max_message_size(&self) -> Option<usize> {
        (**self).max_message_size()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

pub(crate) fn connection_lost(endpoint: Endpoint, reason: impl Into<String>) -> Error {
    Error::ConnectionLost {
        endpoint,
        reason: reason.into(),
    }
}

/// Read timeouts surface as one of these depending on the platform.
pub(crate) fn is_poll_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
    )
}
