//! Error types for mocap-transport.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::core::{Endpoint, EndpointId};

/// Main error type for all session and framing operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not be established (refused, timed out, bind failed).
    #[error("failed to connect {endpoint}: {source}")]
    ConnectFailed {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// Start/end tokens did not validate. The buffer has already been
    /// advanced past `discarded` bytes when this is returned.
    #[error("framing error: start token {start_token:#06X}, end token {end_token:#06X}, discarded {discarded} bytes")]
    Framing {
        start_token: u16,
        end_token: u16,
        discarded: usize,
    },

    /// The live connection failed mid-stream.
    #[error("connection to {endpoint} lost: {reason}")]
    ConnectionLost { endpoint: Endpoint, reason: String },

    /// A session for this endpoint is already registered.
    #[error("endpoint {0} is already open")]
    AlreadyOpen(EndpointId),

    /// No session is registered for this endpoint.
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(EndpointId),

    /// Growing the reassembly buffer failed.
    #[error("buffer allocation failed: {0}")]
    Buffer(#[from] TryReserveError),

    /// I/O error while configuring a socket or spawning a worker.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An address string could not be resolved.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A frame could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

impl Error {
    /// Returns true for errors that end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::ConnectionLost { .. } | Error::Buffer(_))
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
