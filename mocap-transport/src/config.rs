use std::time::Duration;

use crate::buffer::{DEFAULT_MAX_PAYLOAD_COUNT, DEFAULT_RESERVE_CAPACITY};
use crate::core::{HeaderFormat, HEADER_SIZE, VALUE_SIZE};

/// Size of a single receive: one header plus 60 bones of 6 values.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = HEADER_SIZE + 60 * 6 * VALUE_SIZE;

/// How long a TCP connect may take before it counts as refused.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on how long a receive blocks before the stop flag is rechecked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub format: HeaderFormat,
    /// Bytes per read. Datagram transports raise this to their largest message.
    pub recv_buffer_size: usize,
    pub reserve_capacity: usize,
    pub max_payload_count: u32,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            format: HeaderFormat::default(),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            reserve_capacity: DEFAULT_RESERVE_CAPACITY,
            max_payload_count: DEFAULT_MAX_PAYLOAD_COUNT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_format(mut self, format: HeaderFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.max(1);
        self
    }

    pub fn with_reserve_capacity(mut self, capacity: usize) -> Self {
        self.reserve_capacity = capacity;
        self
    }

    pub fn with_max_payload_count(mut self, count: u32) -> Self {
        self.max_payload_count = count;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Zero durations are rejected by socket timeouts, so they are clamped to 1 ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.format, HeaderFormat::Calc);
        assert_eq!(config.recv_buffer_size, 1504);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_builder_clamps() {
        let config = SessionConfig::new()
            .with_format(HeaderFormat::Bvh)
            .with_recv_buffer_size(0)
            .with_poll_interval(Duration::ZERO);
        assert_eq!(config.format, HeaderFormat::Bvh);
        assert_eq!(config.recv_buffer_size, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }
}
