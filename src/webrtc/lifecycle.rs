//! Session teardown and the one-session-per-sink slot

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::session::{NegotiationState, Session};
use crate::events::SessionEvent;

impl Session {
    /// Release every resource held by the session and mark it `Closed`
    ///
    /// Calling it again is a no-op.
    pub async fn dispose(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Disposing session {} ({})", self.id, self.state());

        self.release().await;

        self.state.send_replace(NegotiationState::Closed);
        self.publish(SessionEvent::StateChanged {
            session_id: self.id.clone(),
            state: NegotiationState::Closed,
            at: chrono::Utc::now(),
        });
        self.publish(SessionEvent::Closed {
            session_id: self.id.clone(),
        });
    }

    /// Unsubscribe candidate and track observers, stop every track in the
    /// stream collection, detach the sink and close the connection
    ///
    /// Each resource is taken out of the session as it is released, so
    /// running this after an error and again from `dispose` releases
    /// everything exactly once. The state and error are left untouched.
    pub(crate) async fn release(&self) {
        if let Some(connection) = self.connection.lock().as_ref() {
            connection.on_ice_candidate(None);
            connection.on_track(None);
        }

        self.stream.stop_all().await;

        if let Some(sink) = self.sink.lock().take() {
            sink.detach();
        }

        self.close_connection().await;
    }

    /// Close the connection handle. The handle is taken out of the session,
    /// so it is closed at most once whichever path gets here first.
    pub(crate) async fn close_connection(&self) {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.on_ice_candidate(None);
            connection.on_track(None);
            if let Err(e) = connection.close().await {
                debug!("Session {}: close failed: {}", self.id, e);
            }
        }
    }
}

/// Holds the single active session of a sink
///
/// Installing a new session disposes the previous one first.
#[derive(Default)]
pub struct SessionSlot {
    current: Mutex<Option<Arc<Session>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispose the current session, then install `session`
    pub async fn replace(&self, session: Arc<Session>) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            debug!("Session {} superseded by {}", previous.id(), session.id());
            previous.dispose().await;
        }
        *current = Some(session);
    }

    /// Dispose and forget the current session
    pub async fn clear(&self) {
        let previous = self.current.lock().await.take();
        if let Some(previous) = previous {
            previous.dispose().await;
        }
    }

    pub async fn current(&self) -> Option<Arc<Session>> {
        self.current.lock().await.clone()
    }
}
