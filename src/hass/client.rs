//! Home Assistant websocket client

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use super::messages::{parse_incoming, with_id, AuthMessage, AuthRequest, Incoming};
use crate::error::{AppError, Result};
use crate::webrtc::signaling::{
    ComponentRegistry, OfferRequest, SignalingClient, WebRtcAnswer, WebRtcSettings,
    SETTINGS_COMMAND,
};

type Waiter = oneshot::Sender<std::result::Result<Value, String>>;

/// Outstanding calls by id. `None` once the reader has stopped.
type Pending = Arc<Mutex<Option<HashMap<u64, Waiter>>>>;

/// Authenticated connection to the Home Assistant websocket API
///
/// Commands are tagged with increasing ids and matched to their `result`
/// replies by a reader task.
pub struct HassClient {
    outbound: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: AtomicU64,
    components: RwLock<Vec<String>>,
    ha_version: Option<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl HassClient {
    /// Connect, authenticate and load the component list
    pub async fn connect(url: &str, access_token: &str) -> Result<Self> {
        info!("Connecting to Home Assistant at {}", url);
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| AppError::Transport(format!("Failed to connect to {}: {}", url, e)))?;
        let (mut sink, mut stream) = ws.split();

        let mut ha_version = None;
        loop {
            let text = match stream.next().await {
                Some(Ok(Message::Text(text))) => text.to_string(),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(other)) => {
                    return Err(AppError::AuthError(format!(
                        "Unexpected frame during authentication: {:?}",
                        other
                    )))
                }
                Some(Err(e)) => return Err(AppError::Transport(e.to_string())),
                None => {
                    return Err(AppError::Transport(
                        "Connection closed during authentication".to_string(),
                    ))
                }
            };

            match serde_json::from_str::<AuthMessage>(&text)? {
                AuthMessage::AuthRequired { .. } => {
                    let auth = serde_json::to_string(&AuthRequest::new(access_token))?;
                    sink.send(Message::Text(auth.into()))
                        .await
                        .map_err(|e| AppError::Transport(e.to_string()))?;
                }
                AuthMessage::AuthOk { ha_version: version } => {
                    ha_version = version;
                    break;
                }
                AuthMessage::AuthInvalid { message } => {
                    return Err(AppError::AuthError(
                        message.unwrap_or_else(|| "access token rejected".to_string()),
                    ));
                }
            }
        }
        info!(
            "Authenticated with Home Assistant {}",
            ha_version.as_deref().unwrap_or("(unknown version)")
        );

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("Home Assistant websocket send failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));
        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text.to_string(),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Home Assistant websocket error: {}", e);
                        break;
                    }
                };
                dispatch(&reader_pending, &text);
            }
            debug!("Home Assistant websocket reader finished");
            // Dropping the senders fails every outstanding call, and later
            // calls find no map to register in
            reader_pending.lock().take();
        });

        let client = Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            components: RwLock::new(Vec::new()),
            ha_version,
            reader,
            writer,
        };
        client.refresh_components().await?;
        Ok(client)
    }

    /// Send a command and wait for its result payload
    ///
    /// A failed command yields `AppError::Signaling` with the server's
    /// message.
    pub async fn call_ws(&self, command: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&with_id(command, id))?;
        let (tx, rx) = oneshot::channel();
        match self.pending.lock().as_mut() {
            Some(pending) => {
                pending.insert(id, tx);
            }
            None => return Err(connection_closed()),
        }

        trace!("-> {}", text);
        if self.outbound.send(Message::Text(text.into())).is_err() {
            if let Some(pending) = self.pending.lock().as_mut() {
                pending.remove(&id);
            }
            return Err(connection_closed());
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(AppError::Signaling(message)),
            Err(_) => Err(AppError::Transport(
                "Home Assistant connection closed before reply".to_string(),
            )),
        }
    }

    /// Reload the list of loaded integrations from `get_config`
    pub async fn refresh_components(&self) -> Result<()> {
        let config = self.call_ws(json!({"type": "get_config"})).await?;
        let components: Vec<String> = config
            .get("components")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        debug!("Home Assistant reports {} loaded components", components.len());
        *self.components.write() = components;
        Ok(())
    }

    /// Whether the websocket reader has stopped
    pub fn is_closed(&self) -> bool {
        self.pending.lock().is_none()
    }

    pub fn ha_version(&self) -> Option<&str> {
        self.ha_version.as_deref()
    }

    pub fn components(&self) -> Vec<String> {
        self.components.read().clone()
    }
}

impl Drop for HassClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn connection_closed() -> AppError {
    AppError::Transport("Home Assistant connection closed".to_string())
}

fn dispatch(pending: &Pending, text: &str) {
    trace!("<- {}", text);
    let messages = match parse_incoming(text) {
        Ok(messages) => messages,
        Err(e) => {
            warn!("Ignoring malformed Home Assistant message: {}", e);
            return;
        }
    };
    for message in messages {
        match message {
            Incoming::Result(result) => {
                let waiter = pending
                    .lock()
                    .as_mut()
                    .and_then(|pending| pending.remove(&result.id));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(result.into_outcome());
                    }
                    None => debug!("Result for unknown request {}", result.id),
                }
            }
            Incoming::Pong { id } => trace!("pong {}", id),
            Incoming::Malformed(e) => warn!("Ignoring malformed Home Assistant message: {}", e),
            Incoming::Other(kind) => trace!("Ignoring '{}' message", kind),
        }
    }
}

#[async_trait]
impl SignalingClient for HassClient {
    async fn exchange(&self, target_id: &str, offer: &str) -> Result<WebRtcAnswer> {
        let request = serde_json::to_value(OfferRequest::new(target_id, offer))?;
        let result = self.call_ws(request).await?;
        serde_json::from_value(result)
            .map_err(|e| AppError::Signaling(format!("Malformed answer: {}", e)))
    }

    async fn fetch_settings(&self) -> Result<Option<WebRtcSettings>> {
        let result = self
            .call_ws(json!({"type": SETTINGS_COMMAND}))
            .await
            .map_err(|e| AppError::SettingsFetch(e.detail()))?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| AppError::SettingsFetch(e.to_string()))
    }
}

impl ComponentRegistry for HassClient {
    fn is_component_loaded(&self, component: &str) -> bool {
        self.components.read().iter().any(|c| c == component)
    }
}
