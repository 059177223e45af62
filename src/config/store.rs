use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by a TOML file
///
/// Reads go through an `ArcSwap` cache; writes persist to disk first and
/// then swap the cache.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    cache: Arc<ArcSwap<AppConfig>>,
    change_tx: broadcast::Sender<ConfigChange>,
}

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub key: String,
}

impl ConfigStore {
    /// Open the store, writing defaults when the file does not exist yet
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let config = Self::load_config(path).await?;
        let cache = Arc::new(ArcSwap::from_pointee(config));
        let (change_tx, _) = broadcast::channel(16);

        Ok(Self {
            path: path.to_path_buf(),
            cache,
            change_tx,
        })
    }

    /// In-memory store, nothing is persisted
    pub fn in_memory(config: AppConfig) -> Self {
        let (change_tx, _) = broadcast::channel(16);
        Self {
            path: PathBuf::new(),
            cache: Arc::new(ArcSwap::from_pointee(config)),
            change_tx,
        }
    }

    async fn load_config(path: &Path) -> Result<AppConfig> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                debug!("Loading configuration from {}", path.display());
                toml::from_str(&text).map_err(|e| {
                    AppError::Config(format!("{}: {}", path.display(), e.message()))
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration at {}, writing defaults", path.display());
                let config = AppConfig::default();
                Self::save_config_to_file(path, &config).await?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_config_to_file(path: &Path, config: &AppConfig) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        let text = toml::to_string_pretty(config)
            .map_err(|e| AppError::Config(format!("Failed to encode configuration: {}", e)))?;
        tokio::fs::write(path, text).await?;
        Ok(())
    }

    /// Current configuration
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Replace the whole configuration
    pub async fn set(&self, config: AppConfig) -> Result<()> {
        Self::save_config_to_file(&self.path, &config).await?;
        self.cache.store(Arc::new(config));
        self.notify("app_config");
        Ok(())
    }

    /// Read-modify-write update; the last writer wins
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let current = self.cache.load();
        let mut config = (**current).clone();
        f(&mut config);

        if config == **current {
            return Ok(());
        }

        Self::save_config_to_file(&self.path, &config).await?;
        self.cache.store(Arc::new(config));
        self.notify("app_config");
        Ok(())
    }

    /// Re-read the file, notifying subscribers when the content changed
    ///
    /// Returns `true` when the configuration changed.
    pub async fn reload(&self) -> Result<bool> {
        if self.path.as_os_str().is_empty() {
            return Ok(false);
        }
        let config = Self::load_config(&self.path).await?;
        if config == **self.cache.load() {
            return Ok(false);
        }
        info!("Configuration reloaded from {}", self.path.display());
        self.cache.store(Arc::new(config));
        self.notify("app_config");
        Ok(true)
    }

    /// Subscribe to configuration changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn notify(&self, key: &str) {
        let _ = self.change_tx.send(ConfigChange {
            key: key.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("ha-webrtc.toml");

        let store = ConfigStore::new(&path).await.unwrap();
        assert!(path.exists());

        let config = store.get();
        assert!(config.card.camera_image.is_none());
        assert!(config.webrtc.local_audio);

        let mut changes = store.subscribe();
        store
            .update(|c| {
                c.card.camera_image = Some("camera.front".to_string());
                c.webrtc.exchange_timeout_ms = Some(5000);
            })
            .await
            .unwrap();
        assert_eq!(changes.recv().await.unwrap().key, "app_config");

        let config = store.get();
        assert_eq!(config.card.camera_image.as_deref(), Some("camera.front"));

        // Reopen and verify persistence
        let store2 = ConfigStore::new(&path).await.unwrap();
        let config = store2.get();
        assert_eq!(config.card.camera_image.as_deref(), Some("camera.front"));
        assert_eq!(config.webrtc.exchange_timeout_ms, Some(5000));
    }

    #[tokio::test]
    async fn test_reload_picks_up_edits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ha-webrtc.toml");
        let store = ConfigStore::new(&path).await.unwrap();
        assert!(!store.reload().await.unwrap());

        tokio::fs::write(&path, "[card]\ncamera_image = \"camera.garage\"\nmuted = false\n")
            .await
            .unwrap();
        assert!(store.reload().await.unwrap());

        let config = store.get();
        let card = &config.card;
        assert_eq!(card.camera_image.as_deref(), Some("camera.garage"));
        assert!(!card.muted());
    }

    #[tokio::test]
    async fn test_unchanged_update_is_silent() {
        let store = ConfigStore::in_memory(AppConfig::default());
        let mut changes = store.subscribe();
        store.update(|_| {}).await.unwrap();
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "card = 12").await.unwrap();

        let err = ConfigStore::new(&path).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
