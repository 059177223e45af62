//! ALSA microphone capture

use alsa::pcm::{Access, Format, Frames, HwParams, State, IO};
use alsa::{Direction, ValueOr, PCM};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};

/// Microphone capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// ALSA device name (e.g., "hw:1,0" or "default")
    pub device_name: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u32,
    /// Samples per channel per frame
    pub frame_size: u32,
    /// Buffer size in frames
    pub buffer_frames: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
            sample_rate: 48000,
            channels: 1,
            frame_size: 960, // 20ms at 48kHz
            buffer_frames: 4096,
        }
    }
}

impl CaptureConfig {
    /// Bytes per interleaved sample frame (16-bit signed)
    pub fn bytes_per_sample(&self) -> usize {
        2 * self.channels as usize
    }

    /// Bytes per capture frame
    pub fn bytes_per_frame(&self) -> usize {
        self.frame_size as usize * self.bytes_per_sample()
    }
}

/// One captured block of interleaved S16 samples
#[derive(Debug, Clone)]
pub struct PcmFrame {
    pub samples: Vec<i16>,
    pub sequence: u64,
}

/// Running capture on a blocking thread
///
/// Frames are delivered on the channel returned by [`MicCapture::open`].
/// Dropping the capture stops it.
pub struct MicCapture {
    device_name: String,
    stop_flag: Arc<AtomicBool>,
}

impl MicCapture {
    /// Open and configure the device, then start capturing
    ///
    /// Fails if the device cannot be opened or configured.
    pub async fn open(config: CaptureConfig) -> Result<(Self, mpsc::Receiver<PcmFrame>)> {
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop_flag = Arc::new(AtomicBool::new(false));

        info!(
            "Opening microphone {} at {}Hz {}ch",
            config.device_name, config.sample_rate, config.channels
        );

        let device_name = config.device_name.clone();
        let flag = stop_flag.clone();
        tokio::task::spawn_blocking(move || {
            let pcm = match open_pcm(&config) {
                Ok(pcm) => {
                    let _ = ready_tx.send(Ok(()));
                    pcm
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = capture_loop(&pcm, &config, &frame_tx, &flag) {
                error!("Microphone capture error: {}", e);
            }
            info!("Microphone capture stopped");
        });

        ready_rx
            .await
            .map_err(|_| AppError::AudioError("capture thread exited".to_string()))??;

        Ok((
            Self {
                device_name,
                stop_flag,
            },
            frame_rx,
        ))
    }

    pub fn stop(&self) {
        if !self.stop_flag.swap(true, Ordering::SeqCst) {
            debug!("Stopping microphone {}", self.device_name);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::SeqCst)
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_pcm(config: &CaptureConfig) -> Result<PCM> {
    let pcm = PCM::new(&config.device_name, Direction::Capture, false).map_err(|e| {
        AppError::AudioError(format!(
            "Failed to open audio device {}: {}",
            config.device_name, e
        ))
    })?;

    {
        let hwp = HwParams::any(&pcm)
            .map_err(|e| AppError::AudioError(format!("Failed to get HwParams: {}", e)))?;
        hwp.set_channels(config.channels)
            .map_err(|e| AppError::AudioError(format!("Failed to set channels: {}", e)))?;
        hwp.set_rate(config.sample_rate, ValueOr::Nearest)
            .map_err(|e| AppError::AudioError(format!("Failed to set sample rate: {}", e)))?;
        hwp.set_format(Format::s16())
            .map_err(|e| AppError::AudioError(format!("Failed to set format: {}", e)))?;
        hwp.set_access(Access::RWInterleaved)
            .map_err(|e| AppError::AudioError(format!("Failed to set access: {}", e)))?;
        hwp.set_buffer_size_near(config.buffer_frames as Frames)
            .map_err(|e| AppError::AudioError(format!("Failed to set buffer size: {}", e)))?;
        hwp.set_period_size_near(config.frame_size as Frames, ValueOr::Nearest)
            .map_err(|e| AppError::AudioError(format!("Failed to set period size: {}", e)))?;
        pcm.hw_params(&hwp)
            .map_err(|e| AppError::AudioError(format!("Failed to apply hw params: {}", e)))?;
    }

    pcm.prepare()
        .map_err(|e| AppError::AudioError(format!("Failed to prepare PCM: {}", e)))?;
    Ok(pcm)
}

fn capture_loop(
    pcm: &PCM,
    config: &CaptureConfig,
    frame_tx: &mpsc::Sender<PcmFrame>,
    stop_flag: &AtomicBool,
) -> Result<()> {
    let mut buffer = vec![0u8; config.bytes_per_frame()];
    let mut sequence = 0u64;

    while !stop_flag.load(Ordering::Relaxed) {
        match pcm.state() {
            State::XRun => {
                warn!("Microphone buffer overrun, recovering");
                let _ = pcm.prepare();
                continue;
            }
            State::Suspended => {
                warn!("Microphone suspended, recovering");
                let _ = pcm.resume();
                continue;
            }
            _ => {}
        }

        // io_bytes() rather than io_checked(): USB devices rarely support mmap
        let io: IO<u8> = pcm.io_bytes();
        match io.readi(&mut buffer) {
            Ok(0) => continue,
            Ok(frames_read) => {
                let byte_count = frames_read * config.bytes_per_sample();
                let frame = PcmFrame {
                    // Copying collect, the byte buffer has no i16 alignment
                    samples: bytemuck::pod_collect_to_vec(&buffer[..byte_count]),
                    sequence,
                };
                sequence += 1;
                if frame_tx.blocking_send(frame).is_err() {
                    debug!("Microphone consumer gone");
                    break;
                }
            }
            Err(e) => {
                let desc = e.to_string();
                if desc.contains("EPIPE") || desc.contains("Broken pipe") {
                    warn!("Microphone buffer overrun");
                    let _ = pcm.prepare();
                } else {
                    return Err(AppError::AudioError(format!("Audio read error: {}", e)));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        let config = CaptureConfig::default();
        assert_eq!(config.bytes_per_sample(), 2);
        assert_eq!(config.bytes_per_frame(), 1920);

        let stereo = CaptureConfig {
            channels: 2,
            ..Default::default()
        };
        assert_eq!(stereo.bytes_per_frame(), 3840);
    }

    #[test]
    fn test_samples_from_unaligned_buffer() {
        let expected = [1i16, -1, i16::MIN];
        let bytes: Vec<u8> = std::iter::once(0u8)
            .chain(expected.iter().flat_map(|s| s.to_ne_bytes()))
            .collect();
        let samples: Vec<i16> = bytemuck::pod_collect_to_vec(&bytes[1..]);
        assert_eq!(samples, expected);
    }
}
