//! Media tracks and the session-scoped stream collection

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use webrtc::track::track_local::TrackLocal;

/// Media kind of a track or transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// A live media track, inbound or locally captured
#[async_trait]
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> String;

    fn kind(&self) -> TrackKind;

    /// Stop the track and release whatever feeds it. Must tolerate repeats.
    async fn stop(&self);

    /// Outbound RTP track, for locally captured media
    fn as_track_local(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        None
    }
}

/// Ordered collection of tracks shown by a sink
///
/// Cloning is cheap and shares the underlying collection.
#[derive(Clone, Default)]
pub struct MediaStream {
    tracks: Arc<Mutex<Vec<Arc<dyn MediaTrack>>>>,
}

impl MediaStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_track(&self, track: Arc<dyn MediaTrack>) {
        debug!("Stream gained {} track {}", track.kind(), track.id());
        self.tracks.lock().push(track);
    }

    pub fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.lock().is_empty()
    }

    /// Stop every track and empty the collection
    pub async fn stop_all(&self) {
        let tracks: Vec<_> = std::mem::take(&mut *self.tracks.lock());
        for track in tracks {
            track.stop().await;
        }
    }

    /// Whether both handles refer to the same collection
    pub fn same_stream(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.tracks, &other.tracks)
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("tracks", &self.len())
            .finish()
    }
}
