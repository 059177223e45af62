//! ha-webrtc - WebRTC viewer for Home Assistant cameras
//!
//! Negotiates a receive-only WebRTC session with a camera through the
//! Home Assistant websocket API and hands the inbound media to a display
//! sink.

#[cfg(feature = "microphone")]
pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod hass;
pub mod viewer;
pub mod webrtc;

pub use error::{AppError, Result};
