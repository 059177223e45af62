//! Microphone as a local media provider

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::capture::{CaptureConfig, MicCapture, PcmFrame};
use super::encoder::{OpusConfig, OpusEncoder};
use crate::error::{AppError, Result};
use crate::webrtc::{LocalMediaProvider, MediaTrack, TrackKind};

/// ALSA microphone encoded to Opus
#[derive(Debug, Clone, Default)]
pub struct AlsaMicrophone {
    pub capture: CaptureConfig,
    pub opus: OpusConfig,
}

impl AlsaMicrophone {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            capture: CaptureConfig {
                device_name: device_name.into(),
                ..Default::default()
            },
            opus: OpusConfig::default(),
        }
    }
}

#[async_trait]
impl LocalMediaProvider for AlsaMicrophone {
    async fn acquire_audio(&self) -> Result<Vec<Arc<dyn MediaTrack>>> {
        let encoder =
            OpusEncoder::new(self.opus.clone()).map_err(|e| AppError::LocalMedia(e.detail()))?;
        let (capture, frames) = MicCapture::open(self.capture.clone())
            .await
            .map_err(|e| AppError::LocalMedia(e.detail()))?;

        let track: Arc<dyn MediaTrack> = Arc::new(MicrophoneTrack::start(capture, frames, encoder));
        Ok(vec![track])
    }
}

/// Outbound Opus track fed by a running capture
pub struct MicrophoneTrack {
    id: String,
    track: Arc<TrackLocalStaticSample>,
    capture: MicCapture,
    pump: JoinHandle<()>,
    stopped: AtomicBool,
}

impl MicrophoneTrack {
    fn start(
        capture: MicCapture,
        mut frames: tokio::sync::mpsc::Receiver<PcmFrame>,
        mut encoder: OpusEncoder,
    ) -> Self {
        let id = format!("mic-{}", uuid::Uuid::new_v4());
        let codec = RTCRtpCodecCapability {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
            rtcp_feedback: vec![],
        };
        let track = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            "ha-webrtc-microphone".to_string(),
        ));

        let writer = track.clone();
        let pump = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let sample = match encoder.encode(&frame.samples) {
                    Ok(sample) => sample,
                    Err(e) => {
                        warn!("Dropping microphone frame {}: {}", frame.sequence, e);
                        continue;
                    }
                };
                if let Err(e) = writer.write_sample(&sample).await {
                    debug!("Failed to write microphone sample: {}", e);
                }
            }
        });

        info!("Microphone track {} started", id);
        Self {
            id,
            track,
            capture,
            pump,
            stopped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MediaTrack for MicrophoneTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.capture.stop();
        self.pump.abort();
        info!("Microphone track {} stopped", self.id);
    }

    fn as_track_local(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        Some(self.track.clone())
    }
}
