use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Settings fetch failed: {0}")]
    SettingsFetch(String),

    #[error("Remote description rejected: {0}")]
    RemoteDescription(String),

    #[error("Local media unavailable: {0}")]
    LocalMedia(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Session disposed: {0}")]
    Disposed(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audio error: {0}")]
    AudioError(String),
}

impl AppError {
    /// Bare human-readable message, without the variant prefix.
    ///
    /// This is what gets shown after "Failed to start WebRTC stream: ".
    pub fn detail(&self) -> String {
        match self {
            Self::Signaling(msg)
            | Self::SettingsFetch(msg)
            | Self::RemoteDescription(msg)
            | Self::LocalMedia(msg)
            | Self::Timeout(msg)
            | Self::Disposed(msg)
            | Self::AuthError(msg)
            | Self::Transport(msg)
            | Self::WebRtcError(msg)
            | Self::Config(msg)
            | Self::AudioError(msg) => msg.clone(),
            Self::Io(e) => e.to_string(),
            Self::Serialization(e) => e.to_string(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
