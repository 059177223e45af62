//! WebRTC signaling types and the signaling client seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Websocket command carrying a camera offer
pub const OFFER_COMMAND: &str = "camera/web_rtc_offer";

/// Websocket command returning relay settings
pub const SETTINGS_COMMAND: &str = "rtsp_to_webrtc/get_settings";

/// Integration whose presence enables the settings lookup
pub const SETTINGS_COMPONENT: &str = "rtsp_to_webrtc";

/// Offer sent to the signaling endpoint
///
/// The SDP already carries the gathered candidates as `a=` lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRequest {
    #[serde(rename = "type")]
    pub command: String,
    pub entity_id: String,
    pub offer: String,
}

impl OfferRequest {
    pub fn new(entity_id: impl Into<String>, offer: impl Into<String>) -> Self {
        Self {
            command: OFFER_COMMAND.to_string(),
            entity_id: entity_id.into(),
            offer: offer.into(),
        }
    }
}

/// Answer returned by the remote camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebRtcAnswer {
    pub answer: String,
}

/// Optional relay settings published by the `rtsp_to_webrtc` integration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebRtcSettings {
    /// `host:port` of a STUN server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stun_server: Option<String>,
}

/// Remote endpoint that trades an offer for an answer
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Send the assembled offer for `target_id` and wait for the answer.
    ///
    /// Errors carry the endpoint's message as `AppError::Signaling`.
    /// Callers must not retry.
    async fn exchange(&self, target_id: &str, offer: &str) -> Result<WebRtcAnswer>;

    /// Best-effort lookup of relay settings
    async fn fetch_settings(&self) -> Result<Option<WebRtcSettings>>;
}

/// Host-side registry of loaded integrations
pub trait ComponentRegistry: Send + Sync {
    fn is_component_loaded(&self, component: &str) -> bool;
}
