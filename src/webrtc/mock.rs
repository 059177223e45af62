//! Test doubles for the transport, signaling and media seams

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::capture::LocalMediaProvider;
use super::config::PeerConfiguration;
use super::connection::{ConnectionFactory, IceCandidateHandler, MediaConnection, TrackHandler};
use super::signaling::{ComponentRegistry, SignalingClient, WebRtcAnswer, WebRtcSettings};
use super::sink::MediaSink;
use super::track::{MediaStream, MediaTrack, TrackKind};
use crate::error::{AppError, Result};

pub const BASE_OFFER: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";
pub const ANSWER: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

pub struct MockTrack {
    id: String,
    kind: TrackKind,
    stops: AtomicUsize,
}

impl MockTrack {
    pub fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            stops: AtomicUsize::new(0),
        })
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTrack for MockTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockSink {
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    current: Mutex<Option<MediaStream>>,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<MediaStream> {
        self.current.lock().clone()
    }
}

impl MediaSink for MockSink {
    fn attach(&self, stream: &MediaStream) {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        *self.current.lock() = Some(stream.clone());
    }

    fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        self.current.lock().take();
    }
}

/// Scripted transport behavior
#[derive(Clone, Default)]
pub struct MockBehavior {
    /// Emitted when the local description is set
    pub candidates: Vec<String>,
    /// Never send the end-of-candidates notification
    pub stall_gathering: bool,
    /// Emitted while the answer is applied, after the offer went out
    pub late_candidate: Option<String>,
    /// Reject the answer with this message
    pub reject_answer: Option<String>,
    /// Inbound tracks delivered once the answer is applied
    pub inbound: Vec<(String, TrackKind)>,
}

pub struct MockConnection {
    behavior: MockBehavior,
    ice_handler: Mutex<Option<IceCandidateHandler>>,
    track_handler: Mutex<Option<TrackHandler>>,
    pub data_channels: Mutex<Vec<String>>,
    pub transceivers: Mutex<Vec<TrackKind>>,
    pub local_description: Mutex<Option<String>>,
    pub remote_answer: Mutex<Option<String>>,
    pub local_tracks: Mutex<Vec<String>>,
    pub inbound: Mutex<Vec<Arc<MockTrack>>>,
    closes: AtomicUsize,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Self::with_behavior(MockBehavior::default())
    }

    pub fn with_behavior(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            ice_handler: Mutex::new(None),
            track_handler: Mutex::new(None),
            data_channels: Mutex::new(Vec::new()),
            transceivers: Mutex::new(Vec::new()),
            local_description: Mutex::new(None),
            remote_answer: Mutex::new(None),
            local_tracks: Mutex::new(Vec::new()),
            inbound: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn emit_candidate(&self, candidate: Option<String>) {
        if let Some(handler) = self.ice_handler.lock().as_ref() {
            handler(candidate);
        }
    }

    pub fn emit_track(&self, track: Arc<dyn MediaTrack>) {
        if let Some(handler) = self.track_handler.lock().as_ref() {
            handler(track);
        }
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn has_ice_handler(&self) -> bool {
        self.ice_handler.lock().is_some()
    }

    pub fn has_track_handler(&self) -> bool {
        self.track_handler.lock().is_some()
    }
}

#[async_trait]
impl MediaConnection for MockConnection {
    async fn create_data_channel(&self, label: &str) -> Result<()> {
        self.data_channels.lock().push(label.to_string());
        Ok(())
    }

    async fn add_recv_transceiver(&self, kind: TrackKind) -> Result<()> {
        self.transceivers.lock().push(kind);
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        Ok(BASE_OFFER.to_string())
    }

    async fn set_local_description(&self, sdp: &str) -> Result<()> {
        *self.local_description.lock() = Some(sdp.to_string());
        for candidate in &self.behavior.candidates {
            self.emit_candidate(Some(candidate.clone()));
        }
        if !self.behavior.stall_gathering {
            self.emit_candidate(None);
        }
        Ok(())
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<()> {
        if let Some(candidate) = &self.behavior.late_candidate {
            self.emit_candidate(Some(candidate.clone()));
        }
        if let Some(message) = &self.behavior.reject_answer {
            return Err(AppError::RemoteDescription(message.clone()));
        }
        *self.remote_answer.lock() = Some(sdp.to_string());
        for (id, kind) in &self.behavior.inbound {
            let track = MockTrack::new(id, *kind);
            self.inbound.lock().push(track.clone());
            self.emit_track(track);
        }
        Ok(())
    }

    async fn add_track(&self, track: Arc<dyn MediaTrack>) -> Result<()> {
        self.local_tracks.lock().push(track.id());
        Ok(())
    }

    fn on_ice_candidate(&self, handler: Option<IceCandidateHandler>) {
        *self.ice_handler.lock() = handler;
    }

    fn on_track(&self, handler: Option<TrackHandler>) {
        *self.track_handler.lock() = handler;
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockFactory {
    behavior: MockBehavior,
    pub configs: Mutex<Vec<PeerConfiguration>>,
    pub connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockFactory {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            ..Default::default()
        })
    }

    pub fn last_connection(&self) -> Arc<MockConnection> {
        self.connections
            .lock()
            .last()
            .cloned()
            .expect("no connection created")
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(
        &self,
        config: &PeerConfiguration,
        _session_id: &str,
    ) -> Result<Arc<dyn MediaConnection>> {
        self.configs.lock().push(config.clone());
        let connection = MockConnection::with_behavior(self.behavior.clone());
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

pub struct MockSignaling {
    answer: std::result::Result<String, String>,
    settings: std::result::Result<Option<WebRtcSettings>, String>,
    /// When set, `exchange` waits for a permit before answering
    pub gate: Option<Arc<Notify>>,
    pub exchanges: Mutex<Vec<(String, String)>>,
    settings_calls: AtomicUsize,
}

impl MockSignaling {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            settings: Ok(None),
            gate: None,
            exchanges: Mutex::new(Vec::new()),
            settings_calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            ..Self::answering("")
        }
    }

    pub fn with_settings(mut self, settings: Option<WebRtcSettings>) -> Self {
        self.settings = Ok(settings);
        self
    }

    pub fn with_settings_error(mut self, message: &str) -> Self {
        self.settings = Err(message.to_string());
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn settings_calls(&self) -> usize {
        self.settings_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.lock().len()
    }
}

#[async_trait]
impl SignalingClient for MockSignaling {
    async fn exchange(&self, target_id: &str, offer: &str) -> Result<WebRtcAnswer> {
        self.exchanges
            .lock()
            .push((target_id.to_string(), offer.to_string()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.answer {
            Ok(answer) => Ok(WebRtcAnswer {
                answer: answer.clone(),
            }),
            Err(message) => Err(AppError::Signaling(message.clone())),
        }
    }

    async fn fetch_settings(&self) -> Result<Option<WebRtcSettings>> {
        self.settings_calls.fetch_add(1, Ordering::SeqCst);
        match &self.settings {
            Ok(settings) => Ok(settings.clone()),
            Err(message) => Err(AppError::SettingsFetch(message.clone())),
        }
    }
}

pub struct MockRegistry(pub bool);

impl ComponentRegistry for MockRegistry {
    fn is_component_loaded(&self, _component: &str) -> bool {
        self.0
    }
}

/// Microphone that either yields one track or fails
pub struct MockMicrophone {
    pub available: bool,
    pub tracks: Mutex<Vec<Arc<MockTrack>>>,
}

impl MockMicrophone {
    pub fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            available,
            tracks: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LocalMediaProvider for MockMicrophone {
    async fn acquire_audio(&self) -> Result<Vec<Arc<dyn MediaTrack>>> {
        if !self.available {
            return Err(AppError::LocalMedia("permission denied".to_string()));
        }
        let track = MockTrack::new("mic", TrackKind::Audio);
        self.tracks.lock().push(track.clone());
        let track: Arc<dyn MediaTrack> = track;
        Ok(vec![track])
    }
}
