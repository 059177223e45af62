//! Two-way audio: ALSA microphone capture sent as an Opus track
//!
//! Built with the `microphone` feature.

mod capture;
mod encoder;
mod microphone;

pub use capture::{CaptureConfig, MicCapture, PcmFrame};
pub use encoder::{OpusConfig, OpusEncoder};
pub use microphone::{AlsaMicrophone, MicrophoneTrack};
