//! WebRTC peer connection backed by webrtc-rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice::mdns::MulticastDnsMode;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_remote::TrackRemote;

use super::config::PeerConfiguration;
use super::connection::{ConnectionFactory, IceCandidateHandler, MediaConnection, TrackHandler};
use super::mdns::{default_mdns_host_name, mdns_mode, mdns_mode_label};
use super::track::{MediaTrack, TrackKind};
use crate::error::{AppError, Result};

fn codec_type(kind: TrackKind) -> RTPCodecType {
    match kind {
        TrackKind::Audio => RTPCodecType::Audio,
        TrackKind::Video => RTPCodecType::Video,
    }
}

/// Inbound track delivered by the remote camera
pub struct RemoteTrack {
    track: Arc<TrackRemote>,
    receiver: Arc<RTCRtpReceiver>,
    stopped: AtomicBool,
}

impl RemoteTrack {
    pub fn new(track: Arc<TrackRemote>, receiver: Arc<RTCRtpReceiver>) -> Self {
        Self {
            track,
            receiver,
            stopped: AtomicBool::new(false),
        }
    }

    /// Underlying RTP source, for sinks that decode
    pub fn remote(&self) -> Arc<TrackRemote> {
        self.track.clone()
    }
}

#[async_trait]
impl MediaTrack for RemoteTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        }
    }

    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.receiver.stop().await {
            debug!("Failed to stop receiver for track {}: {}", self.track.id(), e);
        }
    }
}

/// Connection handle wrapping an `RTCPeerConnection`
pub struct RtcConnection {
    session_id: String,
    pc: Arc<RTCPeerConnection>,
    /// Kept alive for the lifetime of the connection
    data_channels: Mutex<Vec<Arc<RTCDataChannel>>>,
    ice_handler: Arc<Mutex<Option<IceCandidateHandler>>>,
    track_handler: Arc<Mutex<Option<TrackHandler>>>,
}

impl RtcConnection {
    /// Create a new peer connection
    pub async fn new(
        config: &PeerConfiguration,
        session_id: &str,
        mdns: Option<&str>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::WebRtcError(format!("Failed to register interceptors: {}", e))
        })?;

        let mut setting_engine = SettingEngine::default();
        let mode = mdns_mode(mdns);
        setting_engine.set_ice_multicast_dns_mode(mode);
        if mode == MulticastDnsMode::QueryAndGather {
            setting_engine.set_multicast_dns_host_name(default_mdns_host_name(session_id));
        }
        debug!("WebRTC mDNS mode: {} (session {})", mdns_mode_label(mode), session_id);

        let api = APIBuilder::new()
            .with_setting_engine(setting_engine)
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?;

        let connection = Self {
            session_id: session_id.to_string(),
            pc: Arc::new(pc),
            data_channels: Mutex::new(Vec::new()),
            ice_handler: Arc::new(Mutex::new(None)),
            track_handler: Arc::new(Mutex::new(None)),
        };
        connection.setup_event_handlers();

        Ok(connection)
    }

    /// Forward transport callbacks to whichever handlers are registered
    fn setup_event_handlers(&self) {
        let session_id = self.session_id.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                info!("Peer {} connection state: {}", session_id, s);
                Box::pin(async {})
            }));

        let ice_handler = self.ice_handler.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let event = match candidate {
                    Some(c) => match c.to_json() {
                        Ok(init) => Some(Some(init.candidate)),
                        Err(e) => {
                            warn!("Dropping unserializable ICE candidate: {}", e);
                            None
                        }
                    },
                    None => Some(None),
                };
                if let (Some(line), Some(handler)) = (event, ice_handler.lock().as_ref()) {
                    handler(line);
                }
                Box::pin(async {})
            }));

        let track_handler = self.track_handler.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, receiver: Arc<RTCRtpReceiver>, _transceiver| {
                let track: Arc<dyn MediaTrack> = Arc::new(RemoteTrack::new(track, receiver));
                if let Some(handler) = track_handler.lock().as_ref() {
                    handler(track);
                }
                Box::pin(async {})
            },
        ));
    }
}

#[async_trait]
impl MediaConnection for RtcConnection {
    async fn create_data_channel(&self, label: &str) -> Result<()> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create data channel: {}", e)))?;
        self.data_channels.lock().push(dc);
        debug!("Data channel '{}' created", label);
        Ok(())
    }

    async fn add_recv_transceiver(&self, kind: TrackKind) -> Result<()> {
        self.pc
            .add_transceiver_from_kind(
                codec_type(kind),
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| {
                AppError::WebRtcError(format!("Failed to add {} transceiver: {}", kind, e))
            })?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create offer: {}", e)))?;
        Ok(offer.sdp)
    }

    async fn set_local_description(&self, sdp: &str) -> Result<()> {
        let desc = RTCSessionDescription::offer(sdp.to_string())
            .map_err(|e| AppError::WebRtcError(format!("Invalid local offer: {}", e)))?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<()> {
        let desc = RTCSessionDescription::answer(sdp.to_string())
            .map_err(|e| AppError::RemoteDescription(e.to_string()))?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| AppError::RemoteDescription(e.to_string()))
    }

    async fn add_track(&self, track: Arc<dyn MediaTrack>) -> Result<()> {
        let local = track.as_track_local().ok_or_else(|| {
            AppError::LocalMedia(format!("Track {} has no outbound RTP source", track.id()))
        })?;
        self.pc
            .add_track(local)
            .await
            .map_err(|e| AppError::LocalMedia(format!("Failed to add local track: {}", e)))?;
        Ok(())
    }

    fn on_ice_candidate(&self, handler: Option<IceCandidateHandler>) {
        *self.ice_handler.lock() = handler;
    }

    fn on_track(&self, handler: Option<TrackHandler>) {
        *self.track_handler.lock() = handler;
    }

    async fn close(&self) -> Result<()> {
        self.ice_handler.lock().take();
        self.track_handler.lock().take();
        self.pc
            .close()
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to close peer connection: {}", e)))
    }
}

/// Builds [`RtcConnection`]s
#[derive(Debug, Clone, Default)]
pub struct RtcConnectionFactory {
    /// Configured mDNS mode, see [`mdns_mode`]
    pub mdns_mode: Option<String>,
}

impl RtcConnectionFactory {
    pub fn new(mdns_mode: Option<String>) -> Self {
        Self { mdns_mode }
    }
}

#[async_trait]
impl ConnectionFactory for RtcConnectionFactory {
    async fn create(
        &self,
        config: &PeerConfiguration,
        session_id: &str,
    ) -> Result<Arc<dyn MediaConnection>> {
        let connection = RtcConnection::new(config, session_id, self.mdns_mode.as_deref()).await?;
        Ok(Arc::new(connection))
    }
}
