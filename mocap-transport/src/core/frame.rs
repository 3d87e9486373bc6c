//! Frames: one validated header paired with its decoded payload.

use super::header::{PacketHeader, HEADER_SIZE, VALUE_SIZE};
use crate::error::{Error, Result};

/// A fully reassembled packet.
///
/// Frames own their payload; nothing in the reassembly buffer refers to a
/// frame once it has been extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Validated header.
    pub header: PacketHeader,

    /// `header.payload_count` values in wire order.
    pub payload: Vec<f32>,
}

impl Frame {
    /// Pairs a header with its payload.
    ///
    /// The payload length must equal `header.payload_count`.
    pub fn new(header: PacketHeader, payload: Vec<f32>) -> Result<Self> {
        if payload.len() != header.payload_count as usize {
            return Err(Error::Encode(format!(
                "header announces {} values, payload has {}",
                header.payload_count,
                payload.len()
            )));
        }
        Ok(Self { header, payload })
    }

    /// Builds a frame whose header count is taken from the payload.
    pub fn from_values(mut header: PacketHeader, payload: Vec<f32>) -> Self {
        header.payload_count = payload.len() as u32;
        Self { header, payload }
    }

    /// Decodes little-endian `f32` values from raw payload bytes.
    ///
    /// Trailing bytes that do not form a whole value are ignored.
    pub(crate) fn decode_payload(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(VALUE_SIZE)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Avatar index from the header.
    pub fn avatar_index(&self) -> u32 {
        self.header.avatar_index
    }

    /// Frame index from the header.
    pub fn frame_index(&self) -> u32 {
        self.header.frame_index
    }

    /// Payload values.
    pub fn values(&self) -> &[f32] {
        &self.payload
    }

    /// Size of this frame on the wire.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() * VALUE_SIZE
    }

    /// Appends the wire representation of this frame to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.payload.len() != self.header.payload_count as usize {
            return Err(Error::Encode(format!(
                "header announces {} values, payload has {}",
                self.header.payload_count,
                self.payload.len()
            )));
        }

        let header = self.header.encode()?;
        out.reserve(self.wire_size());
        out.extend_from_slice(&header);
        for value in &self.payload {
            out.extend_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    /// Serializes this frame into a new buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.wire_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }
}
