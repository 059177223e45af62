//! Negotiation session state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::connection::{MediaConnection, TrackHandler};
use super::ice::CandidateCollector;
use super::sink::MediaSink;
use super::track::{MediaStream, MediaTrack};
use crate::error::{AppError, Result};
use crate::events::{EventBus, SessionEvent};

/// Lifecycle state of a negotiation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Idle,
    ConfiguringTransport,
    CreatingOffer,
    GatheringCandidates,
    AwaitingAnswer,
    AcquiringLocalMedia,
    Connected,
    Errored,
    Closed,
}

impl NegotiationState {
    /// No negotiation step may follow this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Errored | Self::Closed)
    }
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ConfiguringTransport => "configuring_transport",
            Self::CreatingOffer => "creating_offer",
            Self::GatheringCandidates => "gathering_candidates",
            Self::AwaitingAnswer => "awaiting_answer",
            Self::AcquiringLocalMedia => "acquiring_local_media",
            Self::Connected => "connected",
            Self::Errored => "errored",
            Self::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// One negotiation attempt against one camera
///
/// Created by the negotiator, released through [`Session::dispose`].
pub struct Session {
    pub(super) id: String,
    pub(super) target_id: String,
    pub(super) state: watch::Sender<NegotiationState>,
    pub(super) candidates: CandidateCollector,
    pub(super) local_description: Mutex<Option<String>>,
    pub(super) offer: Mutex<Option<String>>,
    pub(super) connection: Mutex<Option<Arc<dyn MediaConnection>>>,
    pub(super) stream: MediaStream,
    pub(super) sink: Mutex<Option<Arc<dyn MediaSink>>>,
    pub(super) error: Mutex<Option<String>>,
    pub(super) closed: AtomicBool,
    pub(super) remote_applied: AtomicBool,
    pub(super) events: Option<Arc<EventBus>>,
}

impl Session {
    pub fn new(
        target_id: impl Into<String>,
        sink: Option<Arc<dyn MediaSink>>,
        events: Option<Arc<EventBus>>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(NegotiationState::Idle);
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            target_id: target_id.into(),
            state,
            candidates: CandidateCollector::new(),
            local_description: Mutex::new(None),
            offer: Mutex::new(None),
            connection: Mutex::new(None),
            stream: MediaStream::new(),
            sink: Mutex::new(sink),
            error: Mutex::new(None),
            closed: AtomicBool::new(false),
            remote_applied: AtomicBool::new(false),
            events,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn state(&self) -> NegotiationState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn state_watch(&self) -> watch::Receiver<NegotiationState> {
        self.state.subscribe()
    }

    /// User-visible failure message, once the session is `Errored`
    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    /// Candidate lines gathered so far
    pub fn candidates(&self) -> Vec<String> {
        self.candidates.lines()
    }

    /// Local description before candidates were appended
    pub fn local_description(&self) -> Option<String> {
        self.local_description.lock().clone()
    }

    /// Offer as transmitted to the signaling endpoint
    pub fn offer(&self) -> Option<String> {
        self.offer.lock().clone()
    }

    /// Inbound stream collection
    pub fn stream(&self) -> MediaStream {
        self.stream.clone()
    }

    pub fn connection(&self) -> Option<Arc<dyn MediaConnection>> {
        self.connection.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether the remote answer has been applied
    pub fn remote_applied(&self) -> bool {
        self.remote_applied.load(Ordering::SeqCst)
    }

    /// Resolves once the session has been disposed
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == NegotiationState::Closed).await;
    }

    pub(crate) fn collector(&self) -> &CandidateCollector {
        &self.candidates
    }

    /// Move to `next`. Fails once the session is closed or errored.
    pub(crate) fn transition(&self, next: NegotiationState) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::Disposed(format!("session {} is closed", self.id)));
        }
        let mut previous = next;
        let moved = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            previous = std::mem::replace(state, next);
            true
        });
        if !moved {
            return Err(AppError::Disposed(format!(
                "session {} already finished ({})",
                self.id,
                self.state()
            )));
        }

        debug!("Session {}: {} -> {}", self.id, previous, next);
        self.publish(SessionEvent::StateChanged {
            session_id: self.id.clone(),
            state: next,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Adopt the connection handle and subscribe the candidate and track
    /// observers. A closed session closes it right away instead.
    ///
    /// Observers are installed under the handle lock, so a concurrent
    /// `dispose` either rejects the handle here or unsubscribes them later.
    pub(crate) async fn set_connection(
        self: &Arc<Self>,
        connection: Arc<dyn MediaConnection>,
    ) -> Result<()> {
        {
            let mut slot = self.connection.lock();
            if !self.is_closed() {
                connection.on_ice_candidate(Some(self.candidates.handler()));
                connection.on_track(Some(self.track_handler()));
                *slot = Some(connection);
                return Ok(());
            }
        }
        if let Err(e) = connection.close().await {
            debug!("Closing connection of disposed session {}: {}", self.id, e);
        }
        Err(AppError::Disposed(format!("session {} is closed", self.id)))
    }

    pub(crate) fn set_local_description(&self, sdp: &str) {
        *self.local_description.lock() = Some(sdp.to_string());
    }

    /// Freeze the candidate sequence and record the transmitted offer
    pub(crate) fn seal_offer(&self, base_sdp: &str) -> String {
        let lines = self.candidates.freeze();
        let offer = super::ice::assemble_offer(base_sdp, &lines);
        *self.offer.lock() = Some(offer.clone());
        offer
    }

    pub(crate) fn mark_remote_applied(&self) {
        self.remote_applied.store(true, Ordering::SeqCst);
    }

    /// Handler feeding inbound tracks into this session
    pub(crate) fn track_handler(self: &Arc<Self>) -> TrackHandler {
        let session: Weak<Session> = Arc::downgrade(self);
        Box::new(move |track: Arc<dyn MediaTrack>| {
            if let Some(session) = session.upgrade() {
                session.on_inbound_track(track);
            }
        })
    }

    fn on_inbound_track(&self, track: Arc<dyn MediaTrack>) {
        if self.is_closed() {
            debug!("Session {} closed, ignoring track {}", self.id, track.id());
            return;
        }
        let track_id = track.id();
        let kind = track.kind();
        self.stream.add_track(track);

        if let Some(sink) = self.sink.lock().as_ref() {
            sink.attach(&self.stream);
        }
        info!("Session {}: received {} track {}", self.id, kind, track_id);
        self.publish(SessionEvent::TrackAdded {
            session_id: self.id.clone(),
            track_id,
            kind,
        });
    }

    /// Add locally captured tracks to the stream collection so they are
    /// released together with the inbound tracks
    pub(crate) fn adopt_local_tracks(&self, tracks: &[Arc<dyn MediaTrack>]) {
        for track in tracks {
            self.stream.add_track(track.clone());
        }
    }

    /// Record a fatal failure. Only the first message is kept.
    pub(crate) fn fail(&self, message: String) {
        if self.is_closed() {
            return;
        }
        {
            let mut error = self.error.lock();
            if error.is_some() {
                return;
            }
            *error = Some(message.clone());
        }
        self.state.send_replace(NegotiationState::Errored);
        warn!("Session {}: {}", self.id, message);
        self.publish(SessionEvent::StateChanged {
            session_id: self.id.clone(),
            state: NegotiationState::Errored,
            at: Utc::now(),
        });
        self.publish(SessionEvent::Error {
            session_id: self.id.clone(),
            message,
        });
    }

    pub(super) fn publish(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("target_id", &self.target_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webrtc::mock::{MockSink, MockTrack};
    use crate::webrtc::track::TrackKind;

    #[test]
    fn test_transitions_stop_at_errored() {
        let session = Session::new("camera.front", None, None);
        assert_eq!(session.state(), NegotiationState::Idle);

        session.transition(NegotiationState::ConfiguringTransport).unwrap();
        session.fail("Failed to start WebRTC stream: boom".to_string());
        assert_eq!(session.state(), NegotiationState::Errored);

        assert!(session.transition(NegotiationState::CreatingOffer).is_err());
        assert_eq!(session.state(), NegotiationState::Errored);
    }

    #[test]
    fn test_first_error_wins() {
        let session = Session::new("camera.front", None, None);
        session.fail("first".to_string());
        session.fail("second".to_string());
        assert_eq!(session.error().as_deref(), Some("first"));
    }

    #[test]
    fn test_inbound_track_reaches_sink() {
        let sink = MockSink::new();
        let session = Session::new("camera.front", Some(sink.clone()), None);
        let handler = session.track_handler();

        let track: Arc<dyn MediaTrack> = MockTrack::new("video0", TrackKind::Video);
        handler(track);

        assert_eq!(session.stream().len(), 1);
        assert_eq!(sink.attach_count(), 1);
        assert!(sink.current().unwrap().same_stream(&session.stream()));
    }

    #[tokio::test]
    async fn test_state_events_published() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let session = Session::new("camera.front", None, Some(bus));

        session.transition(NegotiationState::ConfiguringTransport).unwrap();
        match rx.recv().await.unwrap() {
            SessionEvent::StateChanged { state, .. } => {
                assert_eq!(state, NegotiationState::ConfiguringTransport)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
