//! WebRTC configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::signaling::WebRtcSettings;

/// Peer connection configuration handed to the transport
///
/// Serializes like the browser `RTCConfiguration`; an empty configuration
/// serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfiguration {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ice_servers: Vec<IceServer>,
}

impl PeerConfiguration {
    /// Build from optional relay settings. Missing settings or a missing
    /// `stun_server` give the empty configuration.
    pub fn from_settings(settings: Option<&WebRtcSettings>) -> Self {
        match settings.and_then(|s| s.stun_server.as_deref()) {
            Some(server) if !server.trim().is_empty() => Self {
                ice_servers: vec![IceServer {
                    urls: vec![format!("stun:{}", server.trim())],
                }],
            },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ice_servers.is_empty()
    }
}

/// ICE server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
}

/// Negotiation tuning
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Upper bound on ICE gathering. `None` waits forever.
    pub gathering_timeout: Option<Duration>,
    /// Upper bound on the offer/answer exchange. `None` waits forever.
    pub exchange_timeout: Option<Duration>,
    /// Try to capture the local microphone for two-way audio
    pub local_audio: bool,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            gathering_timeout: None,
            exchange_timeout: None,
            local_audio: true,
        }
    }
}
