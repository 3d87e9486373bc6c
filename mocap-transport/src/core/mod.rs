//! Core data structures for the mocap stream.
//!
//! This module contains the fundamental building blocks:
//! - PacketHeader: Fixed 64-byte versioned header with start/end tokens
//! - Frame: Validated header plus decoded `f32` payload
//! - Endpoint: Connection identity used to key sessions

mod endpoint;
mod frame;
mod header;

pub use endpoint::{Endpoint, EndpointId, EndpointSpec, TransportKind};
pub use frame::Frame;
pub use header::{
    DataVersion, HeaderFormat, PacketHeader, AVATAR_NAME_LEN, HEADER_SIZE, VALUE_SIZE,
};
