//! Buffer management for the mocap stream.
//!
//! This module provides the reassembly buffer:
//! - FrameBuffer: Growing byte reservoir with packet extraction and resync

mod frame_buffer;

pub use frame_buffer::{Drain, FrameBuffer, DEFAULT_MAX_PAYLOAD_COUNT, DEFAULT_RESERVE_CAPACITY};
