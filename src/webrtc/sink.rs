//! Display sink seam

use parking_lot::Mutex;
use tracing::info;

use super::track::MediaStream;

/// Consumer of the inbound stream, owned by the caller
///
/// A session only holds a reference; it attaches the stream whenever a
/// track arrives and detaches on disposal.
pub trait MediaSink: Send + Sync {
    /// Show `stream`. Called again each time the stream gains a track.
    fn attach(&self, stream: &MediaStream);

    /// Clear the current source
    fn detach(&self);

    /// Playback muted hint
    fn muted(&self) -> bool {
        true
    }
}

/// Sink that logs what it would display
pub struct LogSink {
    name: String,
    muted: bool,
    current: Mutex<Option<MediaStream>>,
}

impl LogSink {
    pub fn new(name: impl Into<String>, muted: bool) -> Self {
        Self {
            name: name.into(),
            muted,
            current: Mutex::new(None),
        }
    }

    /// Stream currently shown, if any
    pub fn current(&self) -> Option<MediaStream> {
        self.current.lock().clone()
    }
}

impl MediaSink for LogSink {
    fn attach(&self, stream: &MediaStream) {
        let tracks: Vec<String> = stream
            .tracks()
            .iter()
            .map(|t| format!("{}:{}", t.kind(), t.id()))
            .collect();
        info!(
            "[{}] showing stream with {} track(s) [{}] (muted={})",
            self.name,
            tracks.len(),
            tracks.join(", "),
            self.muted
        );
        *self.current.lock() = Some(stream.clone());
    }

    fn detach(&self) {
        if self.current.lock().take().is_some() {
            info!("[{}] source cleared", self.name);
        }
    }

    fn muted(&self) -> bool {
        self.muted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webrtc::mock::MockTrack;
    use crate::webrtc::track::TrackKind;

    #[test]
    fn test_log_sink_attach_detach() {
        let sink = LogSink::new("front", false);
        assert!(!sink.muted());
        assert!(sink.current().is_none());

        let stream = MediaStream::new();
        stream.add_track(MockTrack::new("v0", TrackKind::Video));
        sink.attach(&stream);
        assert!(sink.current().unwrap().same_stream(&stream));

        sink.detach();
        assert!(sink.current().is_none());
    }
}
