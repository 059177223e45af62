//! Connection handle seam
//!
//! The negotiator only talks to the transport through [`MediaConnection`].
//! Candidate and track discovery are delivered to at most one registered
//! handler per event kind; registering `None` unsubscribes.

use std::sync::Arc;

use async_trait::async_trait;

use super::config::PeerConfiguration;
use super::track::{MediaTrack, TrackKind};
use crate::error::Result;

/// Receives `Some(candidate)` per discovered candidate and `None` once
/// gathering is complete
pub type IceCandidateHandler = Box<dyn Fn(Option<String>) + Send + Sync>;

/// Receives each inbound track
pub type TrackHandler = Box<dyn Fn(Arc<dyn MediaTrack>) + Send + Sync>;

/// Label of the auxiliary data channel some cameras need before streaming
pub const AUX_DATA_CHANNEL: &str = "dataSendChannel";

/// Underlying peer transport of one session
#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Open a data channel
    async fn create_data_channel(&self, label: &str) -> Result<()>;

    /// Declare a receive-only transceiver
    async fn add_recv_transceiver(&self, kind: TrackKind) -> Result<()>;

    /// Create an offer asking to receive audio and video; returns its SDP
    async fn create_offer(&self) -> Result<String>;

    async fn set_local_description(&self, sdp: &str) -> Result<()>;

    /// Apply the remote answer. Failures are `AppError::RemoteDescription`.
    async fn set_remote_answer(&self, sdp: &str) -> Result<()>;

    /// Attach a locally captured track for sending
    async fn add_track(&self, track: Arc<dyn MediaTrack>) -> Result<()>;

    fn on_ice_candidate(&self, handler: Option<IceCandidateHandler>);

    fn on_track(&self, handler: Option<TrackHandler>);

    async fn close(&self) -> Result<()>;
}

/// Creates connection handles for new sessions
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(
        &self,
        config: &PeerConfiguration,
        session_id: &str,
    ) -> Result<Arc<dyn MediaConnection>>;
}
