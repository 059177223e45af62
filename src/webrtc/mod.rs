//! WebRTC viewing of Home Assistant cameras
//!
//! A [`Negotiator`] drives one [`Session`] per viewing attempt:
//!
//! ```text
//! Negotiator
//!     |  peer configuration (rtsp_to_webrtc settings)
//!     v
//! MediaConnection ---- ICE candidates ----> CandidateCollector
//!     |                                          |
//!     |   offer + candidates                     |
//!     +------------> SignalingClient <-----------+
//!     |                  | answer
//!     v                  v
//! inbound tracks --> MediaStream --> MediaSink
//! ```
//!
//! The transport, signaling endpoint, local capture and display are all
//! behind traits so the pipeline runs against webrtc-rs in production and
//! against in-memory doubles in tests.

pub mod capture;
pub mod config;
pub mod connection;
pub mod ice;
mod lifecycle;
pub mod mdns;
pub mod negotiator;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod sink;
pub mod track;

#[cfg(test)]
pub(crate) mod mock;

pub use capture::{LocalMediaProvider, NoLocalMedia};
pub use config::{IceServer, NegotiationConfig, PeerConfiguration};
pub use connection::{ConnectionFactory, MediaConnection};
pub use ice::CandidateCollector;
pub use lifecycle::SessionSlot;
pub use negotiator::{Negotiator, CONNECT_FAILURE_PREFIX, START_FAILURE_PREFIX};
pub use peer::{RtcConnection, RtcConnectionFactory};
pub use session::{NegotiationState, Session};
pub use signaling::{ComponentRegistry, SignalingClient, WebRtcAnswer, WebRtcSettings};
pub use sink::{LogSink, MediaSink};
pub use track::{MediaStream, MediaTrack, TrackKind};
