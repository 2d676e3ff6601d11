use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::schema::apply_env_overrides;
use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by a TOML file on disk.
///
/// Uses `ArcSwap` for lock-free reads, the same shape the teacher's
/// database-backed store exposes, so callers never block on a read in a
/// hot path. There is no database here: the only consumer that needed one
/// (user/session auth tables) is out of scope for this gateway.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    cache: Arc<ArcSwap<AppConfig>>,
    change_tx: broadcast::Sender<ConfigChange>,
}

/// Configuration change notification.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub key: String,
}

impl ConfigStore {
    /// Load (or create) the configuration file at `path`, apply
    /// environment variable overrides, and build the cache.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut config = Self::load_file(path).await?;
        apply_env_overrides(&mut config);

        let cache = Arc::new(ArcSwap::from_pointee(config));
        let (change_tx, _) = broadcast::channel(16);

        Ok(Self {
            path: path.to_path_buf(),
            cache,
            change_tx,
        })
    }

    async fn load_file(path: &Path) -> Result<AppConfig> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|e| AppError::Config(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = AppConfig::default();
                Self::save_file(path, &config).await?;
                Ok(config)
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn save_file(path: &Path, config: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(config).map_err(|e| AppError::Config(e.to_string()))?;
        tokio::fs::write(path, toml).await?;
        Ok(())
    }

    /// Get the current configuration (lock-free, zero-copy).
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Replace the entire configuration and persist it.
    pub async fn set(&self, config: AppConfig) -> Result<()> {
        Self::save_file(&self.path, &config).await?;
        self.cache.store(Arc::new(config));
        let _ = self.change_tx.send(ConfigChange {
            key: "app_config".to_string(),
        });
        Ok(())
    }

    /// Read-modify-write the configuration with a closure. Concurrent
    /// updates are last-write-wins, acceptable since config changes here
    /// are infrequent and operator-initiated rather than a hot path.
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let current = self.cache.load();
        let mut config = (**current).clone();
        f(&mut config);

        Self::save_file(&self.path, &config).await?;
        self.cache.store(Arc::new(config));

        let _ = self.change_tx.send(ConfigChange {
            key: "app_config".to_string(),
        });
        Ok(())
    }

    /// Subscribe to configuration change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn loads_defaults_and_persists_updates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gateway.toml");

        let store = ConfigStore::new(&path).await.unwrap();
        assert_eq!(store.get().web.http_port, 8000);

        store
            .update(|c| {
                c.web.http_port = 9000;
            })
            .await
            .unwrap();
        assert_eq!(store.get().web.http_port, 9000);

        // A fresh store over the same file observes the persisted value.
        let store2 = ConfigStore::new(&path).await.unwrap();
        assert_eq!(store2.get().web.http_port, 9000);
    }

    #[tokio::test]
    async fn subscribers_are_notified_on_update() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        let store = ConfigStore::new(&path).await.unwrap();
        let mut rx = store.subscribe();

        store.set(AppConfig::default()).await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.key, "app_config");
    }
}
