//! # mocap-transport - Motion-capture stream ingestion
//!
//! mocap-transport receives frames from a motion-capture server over TCP or
//! UDP and hands them to registered consumers:
//!
//! - **Wire decoding**: 64-byte versioned headers (`Calc` and `Bvh` families)
//!   followed by little-endian `f32` payloads
//! - **Reassembly**: byte-exact packet boundaries regardless of how the stream
//!   is chunked, with forward resynchronization on corrupt headers
//! - **Sessions**: one receive thread per connection with cooperative,
//!   interruptible shutdown
//! - **Registry**: at most one session per endpoint, process-wide or scoped
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Consumer Layer                        │
//! │  ┌──────────────────┐ ┌──────────────┐ ┌─────────────┐  │
//! │  │ SessionObserver  │ │ FrameChannel │ │ActorTracker │  │
//! │  └──────────────────┘ └──────────────┘ └─────────────┘  │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Session Layer                         │
//! │  ┌──────────────────┐ ┌──────────────────────────────┐  │
//! │  │ SessionRegistry  │ │ Session (worker thread)      │  │
//! │  └──────────────────┘ └──────────────────────────────┘  │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Frame Layer                           │
//! │  ┌──────────────┐ ┌──────────────┐ ┌────────────────┐   │
//! │  │ PacketHeader │ │    Frame     │ │  FrameBuffer   │   │
//! │  └──────────────┘ └──────────────┘ └────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Transport Layer                       │
//! │  ┌──────────────┐ ┌──────────────┐ ┌────────────────┐   │
//! │  │ TcpTransport │ │ UdpTransport │ │MemoryTransport │   │
//! │  └──────────────┘ └──────────────┘ └────────────────┘   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use mocap_transport::{Endpoint, Frame, SessionRegistry};
//!
//! let registry = SessionRegistry::global();
//! registry.observers().add(|endpoint: &Endpoint, frame: &Frame| {
//!     println!("{endpoint}: frame {} ({} values)", frame.frame_index(), frame.values().len());
//! });
//!
//! let id = registry.connect_tcp("127.0.0.1:7001")?;
//! // ...
//! registry.close(id);
//! ```

#![deny(unsafe_code)]

pub mod actor;
pub mod buffer;
pub mod config;
pub mod core;
pub mod error;
pub mod registry;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use actor::{ActorKey, ActorStatus, ActorTracker, CallbackId};
pub use buffer::FrameBuffer;
pub use config::SessionConfig;
pub use crate::core::{
    DataVersion, Endpoint, EndpointId, EndpointSpec, Frame, HeaderFormat, PacketHeader,
    TransportKind, HEADER_SIZE,
};
pub use error::{Error, Result};
pub use registry::SessionRegistry;
pub use session::{
    FrameChannel, ObserverId, ObserverList, ReceivedFrame, Session, SessionObserver, SessionState,
    SessionStats,
};
pub use transport::Transport;
