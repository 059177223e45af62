//! Camera viewer
//!
//! Binds a card configuration to a display sink and keeps at most one
//! negotiation session alive for it. Starting again supersedes the
//! previous session; stopping disposes it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CardConfig;
use crate::error::Result;
use crate::webrtc::{MediaSink, NegotiationState, Negotiator, Session, SessionSlot};

pub struct CameraViewer {
    config: Mutex<CardConfig>,
    negotiator: Arc<Negotiator>,
    sink: Arc<dyn MediaSink>,
    slot: SessionSlot,
    /// Configuration problem, shown instead of any session error
    config_error: Mutex<Option<String>>,
    task: Mutex<Option<JoinHandle<NegotiationState>>>,
}

impl CameraViewer {
    pub fn new(config: CardConfig, negotiator: Arc<Negotiator>, sink: Arc<dyn MediaSink>) -> Self {
        Self {
            config: Mutex::new(config),
            negotiator,
            sink,
            slot: SessionSlot::new(),
            config_error: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> CardConfig {
        self.config.lock().clone()
    }

    pub fn title(&self) -> Option<String> {
        self.config.lock().title.clone()
    }

    pub fn muted(&self) -> bool {
        self.config.lock().muted()
    }

    /// Start streaming the configured camera
    ///
    /// Any previous session is disposed before the new one is installed.
    /// Negotiation runs in the background; see [`CameraViewer::settle`].
    pub async fn start(&self) -> Result<Arc<Session>> {
        let camera = {
            let config = self.config.lock();
            match config.camera() {
                Ok(camera) => camera.to_string(),
                Err(e) => {
                    *self.config_error.lock() = Some(e.detail());
                    return Err(e);
                }
            }
        };
        self.config_error.lock().take();

        let session = self.negotiator.create_session(&camera, Some(self.sink.clone()));
        self.slot.replace(session.clone()).await;
        info!("Viewer starting session {} for {}", session.id(), camera);

        let negotiator = self.negotiator.clone();
        let running = session.clone();
        let handle = tokio::spawn(async move { negotiator.negotiate(&running).await });
        // A superseded task winds down on its own once its session is disposed
        *self.task.lock() = Some(handle);
        Ok(session)
    }

    /// Dispose the active session, if any
    pub async fn stop(&self) {
        if let Some(session) = self.slot.current().await {
            debug!("Viewer stopping session {}", session.id());
        }
        self.slot.clear().await;
    }

    /// Wait for the most recent negotiation to finish
    pub async fn settle(&self) -> Option<NegotiationState> {
        let handle = self.task.lock().take()?;
        match handle.await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Negotiation task failed: {}", e);
                None
            }
        }
    }

    /// Apply a new card configuration
    ///
    /// Returns `true` when the viewer was restarted. An unchanged
    /// configuration is ignored.
    pub async fn set_config(&self, config: CardConfig) -> Result<bool> {
        {
            let mut current = self.config.lock();
            if *current == config {
                return Ok(false);
            }
            *current = config;
        }
        self.start().await?;
        Ok(true)
    }

    /// Current user-visible error
    pub async fn error(&self) -> Option<String> {
        if let Some(error) = self.config_error.lock().clone() {
            return Some(error);
        }
        self.slot.current().await.and_then(|session| session.error())
    }

    pub async fn session(&self) -> Option<Arc<Session>> {
        self.slot.current().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webrtc::mock::{
        MockBehavior, MockFactory, MockRegistry, MockSignaling, MockSink, ANSWER,
    };
    use crate::webrtc::TrackKind;

    fn viewer(
        signaling: MockSignaling,
        config: CardConfig,
    ) -> (CameraViewer, Arc<MockSink>, Arc<MockFactory>) {
        viewer_with(signaling, config, MockBehavior::default())
    }

    fn viewer_with(
        signaling: MockSignaling,
        config: CardConfig,
        behavior: MockBehavior,
    ) -> (CameraViewer, Arc<MockSink>, Arc<MockFactory>) {
        let factory = MockFactory::new(MockBehavior {
            inbound: vec![("video0".to_string(), TrackKind::Video)],
            ..behavior
        });
        let negotiator = Negotiator::new(
            Arc::new(signaling),
            Arc::new(MockRegistry(false)),
            factory.clone(),
        );
        let sink = MockSink::new();
        let viewer = CameraViewer::new(config, Arc::new(negotiator), sink.clone());
        (viewer, sink, factory)
    }

    #[tokio::test]
    async fn test_start_connects() {
        let (viewer, sink, _) = viewer(
            MockSignaling::answering(ANSWER),
            CardConfig::for_camera("camera.front"),
        );

        let session = viewer.start().await.unwrap();
        assert_eq!(viewer.settle().await, Some(NegotiationState::Connected));
        assert_eq!(session.target_id(), "camera.front");
        assert_eq!(sink.attach_count(), 1);
        assert!(viewer.error().await.is_none());
        assert!(viewer.muted());
    }

    #[tokio::test]
    async fn test_missing_camera() {
        let (viewer, _, factory) = viewer(MockSignaling::answering(ANSWER), CardConfig::default());

        assert!(viewer.start().await.is_err());
        assert_eq!(viewer.error().await.as_deref(), Some("Invalid configuration"));
        assert!(factory.connections.lock().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_error_shown() {
        let (viewer, _, _) = viewer(
            MockSignaling::rejecting("camera offline"),
            CardConfig::for_camera("camera.front"),
        );

        viewer.start().await.unwrap();
        assert_eq!(viewer.settle().await, Some(NegotiationState::Errored));
        assert_eq!(
            viewer.error().await.as_deref(),
            Some("Failed to start WebRTC stream: camera offline")
        );
    }

    #[tokio::test]
    async fn test_restart_disposes_previous() {
        let (viewer, sink, factory) = viewer(
            MockSignaling::answering(ANSWER),
            CardConfig::for_camera("camera.front"),
        );

        let first = viewer.start().await.unwrap();
        viewer.settle().await;
        let second = viewer.start().await.unwrap();
        viewer.settle().await;

        assert!(first.is_closed());
        assert_eq!(first.state(), NegotiationState::Closed);
        assert_eq!(second.state(), NegotiationState::Connected);
        assert_eq!(factory.connections.lock()[0].close_count(), 1);
        assert!(sink.current().unwrap().same_stream(&second.stream()));
    }

    async fn wait_gathering(session: &Session) {
        session
            .state_watch()
            .wait_for(|s| *s == NegotiationState::GatheringCandidates)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restart_while_gathering() {
        let (viewer, sink, factory) = viewer_with(
            MockSignaling::answering(ANSWER),
            CardConfig::for_camera("camera.front"),
            MockBehavior {
                stall_gathering: true,
                ..Default::default()
            },
        );

        let first = viewer.start().await.unwrap();
        wait_gathering(&first).await;
        let first_task = viewer.task.lock().take().unwrap();

        let second = viewer.start().await.unwrap();
        assert_eq!(first_task.await.unwrap(), NegotiationState::Closed);
        assert!(first.error().is_none());
        assert_eq!(factory.connections.lock()[0].close_count(), 1);

        wait_gathering(&second).await;
        let second_conn = factory.connections.lock()[1].clone();
        second_conn.emit_candidate(None);

        assert_eq!(viewer.settle().await, Some(NegotiationState::Connected));
        assert_eq!(second.state(), NegotiationState::Connected);
        assert_eq!(second_conn.close_count(), 0);
        assert!(sink.current().unwrap().same_stream(&second.stream()));
        assert!(viewer.error().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_disposes() {
        let (viewer, sink, factory) = viewer(
            MockSignaling::answering(ANSWER),
            CardConfig::for_camera("camera.front"),
        );

        let session = viewer.start().await.unwrap();
        viewer.settle().await;
        viewer.stop().await;

        assert_eq!(session.state(), NegotiationState::Closed);
        assert_eq!(sink.detach_count(), 1);
        assert_eq!(factory.last_connection().close_count(), 1);
        assert!(viewer.session().await.is_none());

        // Stopping twice is harmless
        viewer.stop().await;
        assert_eq!(factory.last_connection().close_count(), 1);
    }

    #[tokio::test]
    async fn test_set_config_restarts_on_change() {
        let (viewer, _, factory) = viewer(
            MockSignaling::answering(ANSWER),
            CardConfig::for_camera("camera.front"),
        );
        viewer.start().await.unwrap();
        viewer.settle().await;

        let restarted = viewer
            .set_config(CardConfig::for_camera("camera.front"))
            .await
            .unwrap();
        assert!(!restarted);
        assert_eq!(factory.connections.lock().len(), 1);

        let restarted = viewer
            .set_config(CardConfig::for_camera("camera.back"))
            .await
            .unwrap();
        assert!(restarted);
        viewer.settle().await;
        assert_eq!(viewer.session().await.unwrap().target_id(), "camera.back");
    }
}
