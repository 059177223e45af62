//! Session event types
//!
//! Defines the events broadcast to the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::webrtc::session::NegotiationState;
use crate::webrtc::track::TrackKind;

/// Session event enumeration
///
/// Serialized as `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// Lifecycle state changed
    #[serde(rename = "session.state_changed")]
    StateChanged {
        session_id: String,
        state: NegotiationState,
        at: DateTime<Utc>,
    },

    /// An inbound track reached the sink
    #[serde(rename = "session.track_added")]
    TrackAdded {
        session_id: String,
        track_id: String,
        kind: TrackKind,
    },

    /// The attempt failed; `message` is the user-visible text
    #[serde(rename = "session.error")]
    Error { session_id: String, message: String },

    /// Resources released
    #[serde(rename = "session.closed")]
    Closed { session_id: String },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::StateChanged { session_id, .. }
            | Self::TrackAdded { session_id, .. }
            | Self::Error { session_id, .. }
            | Self::Closed { session_id } => session_id,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "session.state_changed",
            Self::TrackAdded { .. } => "session.track_added",
            Self::Error { .. } => "session.error",
            Self::Closed { .. } => "session.closed",
        }
    }
}
