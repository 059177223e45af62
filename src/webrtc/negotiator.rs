//! Offer/answer negotiation pipeline
//!
//! ```text
//! Idle -> ConfiguringTransport -> CreatingOffer -> GatheringCandidates
//!      -> AwaitingAnswer -> AcquiringLocalMedia -> Connected
//! ```
//!
//! A failed exchange or a rejected answer ends the attempt in `Errored`
//! with a user-visible message; disposal ends it in `Closed`. Nothing is
//! retried: a new attempt needs a new session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::capture::{LocalMediaProvider, NoLocalMedia};
use super::config::{NegotiationConfig, PeerConfiguration};
use super::connection::{ConnectionFactory, MediaConnection, AUX_DATA_CHANNEL};
use super::session::{NegotiationState, Session};
use super::signaling::{ComponentRegistry, SignalingClient, WebRtcAnswer, SETTINGS_COMPONENT};
use super::sink::MediaSink;
use super::track::TrackKind;
use crate::error::{AppError, Result};
use crate::events::EventBus;

/// Prefix for failures up to and including the offer exchange
pub const START_FAILURE_PREFIX: &str = "Failed to start WebRTC stream: ";

/// Prefix for failures applying the remote answer
pub const CONNECT_FAILURE_PREFIX: &str = "Failed to connect WebRTC stream: ";

/// Which half of the pipeline failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Connect,
}

impl Phase {
    fn prefix(self) -> &'static str {
        match self {
            Phase::Start => START_FAILURE_PREFIX,
            Phase::Connect => CONNECT_FAILURE_PREFIX,
        }
    }
}

type PhaseResult<T> = std::result::Result<T, (Phase, AppError)>;

trait InPhase<T> {
    fn phase(self, phase: Phase) -> PhaseResult<T>;
}

impl<T> InPhase<T> for Result<T> {
    fn phase(self, phase: Phase) -> PhaseResult<T> {
        self.map_err(|e| (phase, e))
    }
}

/// Drives sessions through the offer/answer exchange
pub struct Negotiator {
    signaling: Arc<dyn SignalingClient>,
    registry: Arc<dyn ComponentRegistry>,
    factory: Arc<dyn ConnectionFactory>,
    local_media: Arc<dyn LocalMediaProvider>,
    config: NegotiationConfig,
    events: Option<Arc<EventBus>>,
}

impl Negotiator {
    pub fn new(
        signaling: Arc<dyn SignalingClient>,
        registry: Arc<dyn ComponentRegistry>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            signaling,
            registry,
            factory,
            local_media: Arc::new(NoLocalMedia),
            config: NegotiationConfig::default(),
            events: None,
        }
    }

    pub fn with_local_media(mut self, provider: Arc<dyn LocalMediaProvider>) -> Self {
        self.local_media = provider;
        self
    }

    pub fn with_config(mut self, config: NegotiationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// New idle session for `target_id` showing on `sink`
    pub fn create_session(
        &self,
        target_id: &str,
        sink: Option<Arc<dyn MediaSink>>,
    ) -> Arc<Session> {
        Session::new(target_id, sink, self.events.clone())
    }

    /// Resolve the peer configuration
    ///
    /// Settings are only requested when the `rtsp_to_webrtc` integration is
    /// loaded. A failed or empty lookup yields the empty configuration.
    pub async fn peer_configuration(&self) -> PeerConfiguration {
        if !self.registry.is_component_loaded(SETTINGS_COMPONENT) {
            return PeerConfiguration::default();
        }
        match self.signaling.fetch_settings().await {
            Ok(settings) => PeerConfiguration::from_settings(settings.as_ref()),
            Err(e) => {
                warn!("Using default WebRTC configuration: {}", e);
                PeerConfiguration::default()
            }
        }
    }

    /// Run `session` to completion and return its final state
    ///
    /// Failures are recorded on the session (see [`Session::error`]) rather
    /// than returned.
    pub async fn negotiate(&self, session: &Arc<Session>) -> NegotiationState {
        match self.run(session).await {
            Ok(()) => {
                info!(
                    "Session {}: connected to {} ({} candidate(s) offered)",
                    session.id(),
                    session.target_id(),
                    session.candidates().len()
                );
            }
            Err((_, AppError::Disposed(reason))) => {
                debug!("Session {} abandoned: {}", session.id(), reason);
            }
            Err((phase, e)) => {
                session.fail(format!("{}{}", phase.prefix(), e.detail()));
                session.release().await;
            }
        }
        session.state()
    }

    async fn run(&self, session: &Arc<Session>) -> PhaseResult<()> {
        use Phase::*;

        session
            .transition(NegotiationState::ConfiguringTransport)
            .phase(Start)?;
        let configuration = self.peer_configuration().await;
        debug!(
            "Session {}: {} ICE server(s) configured",
            session.id(),
            configuration.ice_servers.len()
        );

        session
            .transition(NegotiationState::CreatingOffer)
            .phase(Start)?;
        let connection = self
            .factory
            .create(&configuration, session.id())
            .await
            .phase(Start)?;
        session.set_connection(connection.clone()).await.phase(Start)?;

        let base_sdp = self.create_offer(connection.as_ref()).await.phase(Start)?;
        session.set_local_description(&base_sdp);

        session
            .transition(NegotiationState::GatheringCandidates)
            .phase(Start)?;
        self.until_disposed(
            session,
            session.collector().wait_complete(self.config.gathering_timeout),
        )
        .await
        .phase(Start)?;
        connection.on_ice_candidate(None);

        session
            .transition(NegotiationState::AwaitingAnswer)
            .phase(Start)?;
        let offer = session.seal_offer(&base_sdp);
        debug!(
            "Session {}: sending offer with {} candidate(s)",
            session.id(),
            session.candidates().len()
        );
        let answer = self
            .until_disposed(session, self.exchange(session.target_id(), &offer))
            .await
            .phase(Start)?;

        session
            .transition(NegotiationState::AcquiringLocalMedia)
            .phase(Connect)?;
        self.attach_local_media(session, connection.as_ref())
            .await
            .phase(Connect)?;

        connection
            .set_remote_answer(&answer.answer)
            .await
            .phase(Connect)?;
        session.mark_remote_applied();

        session
            .transition(NegotiationState::Connected)
            .phase(Connect)
    }

    /// Data channel, receive-only transceivers, offer as local description
    async fn create_offer(&self, connection: &dyn MediaConnection) -> Result<String> {
        // Some cameras will not start streaming without a data channel
        connection.create_data_channel(AUX_DATA_CHANNEL).await?;
        connection.add_recv_transceiver(TrackKind::Audio).await?;
        connection.add_recv_transceiver(TrackKind::Video).await?;

        let sdp = connection.create_offer().await?;
        connection.set_local_description(&sdp).await?;
        Ok(sdp)
    }

    async fn exchange(&self, target_id: &str, offer: &str) -> Result<WebRtcAnswer> {
        let exchange = self.signaling.exchange(target_id, offer);
        match self.config.exchange_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| timeout_error("offer exchange", limit))?,
            None => exchange.await,
        }
    }

    /// Best-effort microphone capture; never fails the negotiation
    async fn attach_local_media(
        &self,
        session: &Session,
        connection: &dyn MediaConnection,
    ) -> Result<()> {
        if !self.config.local_audio {
            return Ok(());
        }
        let tracks = match self.local_media.acquire_audio().await {
            Ok(tracks) => tracks,
            Err(e) => {
                debug!("Session {}: continuing without local audio: {}", session.id(), e);
                return Ok(());
            }
        };

        if session.is_closed() {
            for track in &tracks {
                track.stop().await;
            }
            return Err(AppError::Disposed(format!("session {} is closed", session.id())));
        }

        for track in &tracks {
            if let Err(e) = connection.add_track(track.clone()).await {
                debug!("Session {}: local track not sent: {}", session.id(), e);
            }
        }
        session.adopt_local_tracks(&tracks);
        Ok(())
    }

    /// Run `fut`, giving up as soon as the session is disposed
    async fn until_disposed<T>(
        &self,
        session: &Session,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            result = fut => result,
            _ = session.closed() => {
                Err(AppError::Disposed(format!("session {} closed while waiting", session.id())))
            }
        }
    }
}

fn timeout_error(what: &str, limit: Duration) -> AppError {
    AppError::Timeout(format!("{} did not complete within {:?}", what, limit))
}
