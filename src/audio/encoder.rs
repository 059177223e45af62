//! Opus encoding of microphone frames into WebRTC media samples

use audiopus::{coder::Encoder, Application, Bitrate, Channels, SampleRate};
use bytes::Bytes;
use std::time::Duration;
use tracing::{info, trace};
use webrtc::media::Sample;

use crate::error::{AppError, Result};

/// Opus encoder configuration
#[derive(Debug, Clone)]
pub struct OpusConfig {
    /// Sample rate (8000, 12000, 16000, 24000 or 48000)
    pub sample_rate: u32,
    /// Channels (1 or 2)
    pub channels: u32,
    /// Target bitrate in bps
    pub bitrate: u32,
}

impl Default for OpusConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            bitrate: 32000,
        }
    }
}

impl OpusConfig {
    fn sample_rate(&self) -> SampleRate {
        match self.sample_rate {
            8000 => SampleRate::Hz8000,
            12000 => SampleRate::Hz12000,
            16000 => SampleRate::Hz16000,
            24000 => SampleRate::Hz24000,
            _ => SampleRate::Hz48000,
        }
    }

    fn channels(&self) -> Channels {
        if self.channels == 1 {
            Channels::Mono
        } else {
            Channels::Stereo
        }
    }
}

/// Voice-tuned Opus encoder producing one sample per capture frame
pub struct OpusEncoder {
    config: OpusConfig,
    encoder: Encoder,
    output_buffer: Vec<u8>,
    packets: u64,
}

impl OpusEncoder {
    pub fn new(config: OpusConfig) -> Result<Self> {
        let mut encoder = Encoder::new(config.sample_rate(), config.channels(), Application::Voip)
            .map_err(|e| {
                AppError::AudioError(format!("Failed to create Opus encoder: {:?}", e))
            })?;
        encoder
            .set_bitrate(Bitrate::BitsPerSecond(config.bitrate as i32))
            .map_err(|e| AppError::AudioError(format!("Failed to set bitrate: {:?}", e)))?;

        info!(
            "Opus encoder created: {}Hz {}ch {}bps",
            config.sample_rate, config.channels, config.bitrate
        );

        Ok(Self {
            config,
            encoder,
            output_buffer: vec![0u8; 4000], // Max Opus frame size
            packets: 0,
        })
    }

    /// Encode interleaved S16 samples into a media sample
    ///
    /// The sample duration is derived from the frame length so the RTP
    /// timestamps advance with the capture clock.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Sample> {
        let encoded_len = self
            .encoder
            .encode(pcm, &mut self.output_buffer)
            .map_err(|e| AppError::AudioError(format!("Opus encode failed: {:?}", e)))?;
        self.packets += 1;

        let per_channel = pcm.len() as u64 / self.config.channels.max(1) as u64;
        trace!("Opus packet {}: {} bytes", self.packets, encoded_len);

        Ok(Sample {
            data: Bytes::copy_from_slice(&self.output_buffer[..encoded_len]),
            duration: frame_duration(per_channel, self.config.sample_rate),
            ..Default::default()
        })
    }

    /// Packets encoded so far
    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn config(&self) -> &OpusConfig {
        &self.config
    }
}

fn frame_duration(samples_per_channel: u64, sample_rate: u32) -> Duration {
    Duration::from_micros(samples_per_channel * 1_000_000 / sample_rate.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration() {
        assert_eq!(frame_duration(960, 48000), Duration::from_millis(20));
        assert_eq!(frame_duration(160, 16000), Duration::from_millis(10));
    }

    #[test]
    fn test_encode_silence() {
        let mut encoder = OpusEncoder::new(OpusConfig::default()).unwrap();
        let sample = encoder.encode(&[0i16; 960]).unwrap();
        assert!(!sample.data.is_empty());
        assert_eq!(sample.duration, Duration::from_millis(20));
        assert_eq!(encoder.packets(), 1);
    }
}
