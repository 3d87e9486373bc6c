//! Reassembly buffer turning an unstructured byte stream into frames.
//!
//! Bytes are appended as they arrive from the transport. Complete packets
//! are extracted from the front; whatever follows is shifted to offset 0 so
//! the reserve can be reused for the next receive.
//!
//! # Example
//!
//! ```ignore
//! use mocap_transport::{FrameBuffer, HeaderFormat};
//!
//! let mut buffer = FrameBuffer::new(HeaderFormat::Calc);
//! buffer.append(&chunk)?;
//!
//! for item in buffer.drain() {
//!     match item {
//!         Ok(frame) => println!("frame {}", frame.frame_index()),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

use crate::core::{Frame, HeaderFormat, PacketHeader, HEADER_SIZE};
use crate::error::{Error, Result};

/// Initial reserve capacity in bytes.
pub const DEFAULT_RESERVE_CAPACITY: usize = 4096;

/// Largest payload count accepted before a header is treated as corrupt.
pub const DEFAULT_MAX_PAYLOAD_COUNT: u32 = 16 * 1024;

/// Accumulating byte reservoir with packet extraction.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Backing storage. `reserve.len()` is a high-water mark, never shrunk.
    reserve: Vec<u8>,

    /// Number of valid bytes at the front of `reserve`.
    reserve_size: usize,

    /// Header family expected on this stream.
    format: HeaderFormat,

    /// Upper bound on `payload_count` before resynchronizing.
    max_payload_count: u32,
}

impl FrameBuffer {
    /// Creates a buffer with the default capacity.
    pub fn new(format: HeaderFormat) -> Self {
        Self {
            reserve: Vec::with_capacity(DEFAULT_RESERVE_CAPACITY),
            reserve_size: 0,
            format,
            max_payload_count: DEFAULT_MAX_PAYLOAD_COUNT,
        }
    }

    /// Creates a buffer with room for `capacity` bytes up front.
    ///
    /// Fails if the allocation cannot be satisfied.
    pub fn with_capacity(format: HeaderFormat, capacity: usize) -> Result<Self> {
        let mut reserve = Vec::new();
        reserve.try_reserve_exact(capacity)?;
        Ok(Self {
            reserve,
            reserve_size: 0,
            format,
            max_payload_count: DEFAULT_MAX_PAYLOAD_COUNT,
        })
    }

    /// Sets the payload count limit.
    pub fn with_max_payload_count(mut self, max_payload_count: u32) -> Self {
        self.max_payload_count = max_payload_count;
        self
    }

    /// Header family this buffer validates against.
    pub fn format(&self) -> HeaderFormat {
        self.format
    }

    /// Number of buffered bytes not yet extracted.
    pub fn len(&self) -> usize {
        self.reserve_size
    }

    /// Returns true if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.reserve_size == 0
    }

    /// Current reserve capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.reserve.capacity()
    }

    /// Drops all buffered bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.reserve_size = 0;
    }

    /// Copies newly received bytes behind the valid region.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let needed = self.reserve_size + data.len();
        if needed > self.reserve.len() {
            if needed > self.reserve.capacity() {
                self.reserve.try_reserve(needed - self.reserve.len())?;
            }
            self.reserve.resize(needed, 0);
        }

        self.reserve[self.reserve_size..needed].copy_from_slice(data);
        self.reserve_size = needed;
        Ok(())
    }

    /// Tries to extract one frame from the front of the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete packet was extracted
    /// - `Ok(None)` if more bytes are needed
    /// - `Err(Error::Framing { .. })` if the header was corrupt; the buffer
    ///   has already skipped forward to the next candidate start token
    pub fn try_extract_frame(&mut self) -> Result<Option<Frame>> {
        if self.reserve_size < HEADER_SIZE {
            return Ok(None);
        }

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.reserve[..HEADER_SIZE]);

        let header = match PacketHeader::decode(self.format, &raw) {
            Some(header) if header.payload_count <= self.max_payload_count => header,
            _ => {
                let (start_token, end_token) = PacketHeader::read_tokens(&raw);
                let discarded = self.resync();
                return Err(Error::Framing {
                    start_token,
                    end_token,
                    discarded,
                });
            }
        };

        let packet_size = header.packet_size();
        if self.reserve_size < packet_size {
            return Ok(None);
        }

        let payload = Frame::decode_payload(&self.reserve[HEADER_SIZE..packet_size]);
        self.consume(packet_size);

        log::trace!(
            "Extracted frame avatar={} index={} values={}, {} bytes left",
            header.avatar_index,
            header.frame_index,
            payload.len(),
            self.reserve_size
        );

        Ok(Some(Frame { header, payload }))
    }

    /// Drops a partial packet left behind at a message boundary.
    ///
    /// Datagram transports never continue a packet in the next message, so
    /// whatever remains after draining one is unusable. Returns the framing
    /// error describing the dropped bytes, or `None` if nothing was left.
    pub fn discard_partial(&mut self) -> Option<Error> {
        if self.reserve_size == 0 {
            return None;
        }

        let valid = &self.reserve[..self.reserve_size];
        let start_token = match valid {
            [a, b, ..] => u16::from_le_bytes([*a, *b]),
            _ => 0,
        };
        let end_token = if valid.len() >= HEADER_SIZE {
            u16::from_le_bytes([valid[HEADER_SIZE - 2], valid[HEADER_SIZE - 1]])
        } else {
            0
        };
        let discarded = self.reserve_size;
        self.reserve_size = 0;

        Some(Error::Framing {
            start_token,
            end_token,
            discarded,
        })
    }

    /// Iterates over extractable frames until more bytes are needed.
    ///
    /// Framing errors are yielded in place; the iterator always terminates
    /// because every framing error discards at least one byte.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain { buffer: self }
    }

    /// Shifts the bytes behind the first `count` to the front.
    fn consume(&mut self, count: usize) {
        self.reserve.copy_within(count..self.reserve_size, 0);
        self.reserve_size -= count;
    }

    /// Skips to the next occurrence of the start token after offset 0.
    ///
    /// If none is found, keeps a trailing byte that may begin a token split
    /// across receives. Returns the number of bytes discarded (at least 1).
    fn resync(&mut self) -> usize {
        let token = self.format.start_token().to_le_bytes();
        let valid = &self.reserve[..self.reserve_size];

        let skip = valid[1..]
            .windows(2)
            .position(|w| w == token)
            .map(|pos| pos + 1)
            .unwrap_or_else(|| {
                if valid[valid.len() - 1] == token[0] {
                    valid.len() - 1
                } else {
                    valid.len()
                }
            });

        self.consume(skip);
        skip
    }
}

/// Iterator returned by [`FrameBuffer::drain`].
pub struct Drain<'a> {
    buffer: &'a mut FrameBuffer,
}

impl Iterator for Drain<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.try_extract_frame().transpose()
    }
}
