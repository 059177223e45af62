//! Local media capture seam

use std::sync::Arc;

use async_trait::async_trait;

use super::track::MediaTrack;
use crate::error::{AppError, Result};

/// Source of locally captured media (the viewer's microphone)
#[async_trait]
pub trait LocalMediaProvider: Send + Sync {
    /// Acquire an audio capture. Errors are `AppError::LocalMedia` and never
    /// abort a negotiation.
    async fn acquire_audio(&self) -> Result<Vec<Arc<dyn MediaTrack>>>;
}

/// Provider for hosts without capture devices
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalMedia;

#[async_trait]
impl LocalMediaProvider for NoLocalMedia {
    async fn acquire_audio(&self) -> Result<Vec<Arc<dyn MediaTrack>>> {
        Err(AppError::LocalMedia("no capture device available".to_string()))
    }
}
