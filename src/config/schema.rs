use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::webrtc::config::NegotiationConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Home Assistant connection
    pub hass: HassConfig,
    /// Camera card settings
    pub card: CardConfig,
    /// WebRTC negotiation settings
    pub webrtc: WebRtcConfig,
}

/// Home Assistant connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HassConfig {
    /// Websocket API endpoint
    pub url: String,
    /// Long-lived access token
    pub token: Option<String>,
}

impl Default for HassConfig {
    fn default() -> Self {
        Self {
            url: "ws://homeassistant.local:8123/api/websocket".to_string(),
            token: None,
        }
    }
}

/// Camera card configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardConfig {
    /// Camera entity to stream (e.g. `camera.front_door`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Playback mute hint, `true` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

impl CardConfig {
    pub fn for_camera(camera: impl Into<String>) -> Self {
        Self {
            camera_image: Some(camera.into()),
            ..Default::default()
        }
    }

    /// Target camera entity. A card without one is rejected.
    pub fn camera(&self) -> Result<&str> {
        match self.camera_image.as_deref().map(str::trim) {
            Some(camera) if !camera.is_empty() => Ok(camera),
            _ => Err(AppError::Config("Invalid configuration".to_string())),
        }
    }

    pub fn muted(&self) -> bool {
        self.muted.unwrap_or(true)
    }
}

/// WebRTC negotiation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// ICE gathering limit in milliseconds, unbounded when absent
    pub gathering_timeout_ms: Option<u64>,
    /// Offer/answer exchange limit in milliseconds, unbounded when absent
    pub exchange_timeout_ms: Option<u64>,
    /// mDNS candidate mode: disabled, query_only or query_and_gather
    pub mdns_mode: Option<String>,
    /// Capture the microphone for two-way audio
    pub local_audio: bool,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            gathering_timeout_ms: None,
            exchange_timeout_ms: None,
            mdns_mode: None,
            local_audio: true,
        }
    }
}

impl WebRtcConfig {
    pub fn negotiation(&self) -> NegotiationConfig {
        NegotiationConfig {
            gathering_timeout: self.gathering_timeout_ms.map(Duration::from_millis),
            exchange_timeout: self.exchange_timeout_ms.map(Duration::from_millis),
            local_audio: self.local_audio,
        }
    }
}
