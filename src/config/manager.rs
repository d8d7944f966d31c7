//! [MODULE G] ConfigManager — load, validate, digest, atomic swap, and the
//! pending-update queue that lets a config change apply at the next safe
//! transition point instead of mid-execution (§4.G).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::config::model::Configuration;
use crate::errors::ConfigError;

pub struct ConfigStats {
    pub songs: usize,
    pub albums: usize,
    pub artists: usize,
    pub playlists: usize,
}

struct Inner {
    active: Configuration,
    pending: Option<Configuration>,
    path: PathBuf,
}

/// Owns the active configuration plus at most one queued replacement.
/// `RwLock` rather than per-field locks because swaps always replace both
/// fields together and readers vastly outnumber writers.
pub struct ConfigManager {
    inner: RwLock<Inner>,
}

impl ConfigManager {
    /// Loads a TOML file layered with environment overrides (prefix
    /// `CRATEDIGGER_`), matching the teacher's figment-based config loader.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: Configuration = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CRATEDIGGER_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?;

        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Validation {
                message: errors.join("; "),
            });
        }

        Ok(Self {
            inner: RwLock::new(Inner {
                active: config,
                pending: None,
                path: path.to_path_buf(),
            }),
        })
    }

    pub fn from_configuration(config: Configuration, path: impl AsRef<Path>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                active: config,
                pending: None,
                path: path.as_ref().to_path_buf(),
            }),
        }
    }

    pub async fn active(&self) -> Configuration {
        self.inner.read().await.active.clone()
    }

    /// SHA-256 hex digest over the canonical `serde_json` serialization of
    /// the active configuration (§4.G, §GLOSSARY "Digest").
    pub async fn digest(&self) -> String {
        let active = self.inner.read().await.active.clone();
        Self::digest_of(&active)
    }

    fn digest_of(config: &Configuration) -> String {
        let canonical =
            serde_json::to_vec(config).expect("Configuration serialization is infallible");
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    pub async fn config_stats(&self) -> ConfigStats {
        let active = &self.inner.read().await.active;
        ConfigStats {
            songs: active.songs.len(),
            albums: active.albums.len(),
            artists: active.artists.len(),
            playlists: active.playlists.len(),
        }
    }

    /// Validates and stores a replacement without swapping it in.
    pub async fn queue_update(&self, new_cfg: Configuration) -> Result<(), ConfigError> {
        let errors = new_cfg.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Validation {
                message: errors.join("; "),
            });
        }
        self.inner.write().await.pending = Some(new_cfg);
        Ok(())
    }

    pub async fn get_pending_update(&self) -> Option<Configuration> {
        self.inner.read().await.pending.clone()
    }

    pub async fn has_pending(&self) -> bool {
        self.inner.read().await.pending.is_some()
    }

    /// Discards any queued replacement without promoting it to active.
    /// Used by `DownloadService::reset` (§4.F "Reset clears pending
    /// config"), as distinct from `apply_pending_update` which promotes it.
    pub async fn clear_pending(&self) {
        self.inner.write().await.pending = None;
    }

    /// Atomically swaps the pending configuration into place if present;
    /// clears the pending slot either way. Called at Start (§4.F step 1).
    pub async fn apply_pending_update(&self) -> Option<Configuration> {
        let mut inner = self.inner.write().await;
        if let Some(pending) = inner.pending.take() {
            inner.active = pending.clone();
            Some(pending)
        } else {
            None
        }
    }

    /// Writes the active configuration to disk: temp file + rename, with a
    /// `.backup` sibling of whatever file previously existed there (§4.G).
    pub async fn persist(&self) -> Result<(), ConfigError> {
        let active = self.inner.read().await.active.clone();
        self.persist_config(&active).await
    }

    /// Same write path as `persist`, but for an arbitrary configuration —
    /// used by the HTTP `PUT /api/config` handler to write a queued (not
    /// yet applied) replacement to disk without disturbing `active`.
    pub async fn persist_config(&self, config: &Configuration) -> Result<(), ConfigError> {
        let path = self.inner.read().await.path.clone();
        let toml_body = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let backup_path = Self::backup_path(&path);
            let _ = tokio::fs::copy(&path, &backup_path).await;
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("config.toml")
        ));
        tokio::fs::write(&tmp_path, toml_body.as_bytes())
            .await
            .map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".backup");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{Credentials, SourceEntry};

    fn sample() -> Configuration {
        Configuration {
            version: "v1.0.0".to_string(),
            credentials: Credentials {
                username: "user".to_string(),
                password: String::new(),
                token: None,
            },
            threads: 4,
            output_format: Default::default(),
            bitrate_kbps: 320,
            provider_preference: Vec::new(),
            overwrite_policy: Default::default(),
            cache: Default::default(),
            rate_limit: Default::default(),
            retry: Default::default(),
            advanced: Default::default(),
            output_directory: "/music".to_string(),
            songs: vec![SourceEntry {
                name: "a".to_string(),
                url: "https://example.invalid/track/1".to_string(),
                create_m3u: false,
            }],
            albums: Vec::new(),
            artists: Vec::new(),
            playlists: Vec::new(),
        }
    }

    #[tokio::test]
    async fn digest_is_stable_for_identical_config() {
        let manager = ConfigManager::from_configuration(sample(), "/tmp/does-not-matter.toml");
        let d1 = manager.digest().await;
        let d2 = manager.digest().await;
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
    }

    #[tokio::test]
    async fn queue_and_apply_pending_update() {
        let manager = ConfigManager::from_configuration(sample(), "/tmp/does-not-matter.toml");
        assert!(!manager.has_pending().await);

        let mut replacement = sample();
        replacement.threads = 8;
        manager.queue_update(replacement).await.unwrap();
        assert!(manager.has_pending().await);

        let applied = manager.apply_pending_update().await.unwrap();
        assert_eq!(applied.threads, 8);
        assert_eq!(manager.active().await.threads, 8);
        assert!(!manager.has_pending().await);
    }

    #[tokio::test]
    async fn clear_pending_discards_without_promoting() {
        let manager = ConfigManager::from_configuration(sample(), "/tmp/does-not-matter.toml");
        let mut replacement = sample();
        replacement.threads = 8;
        manager.queue_update(replacement).await.unwrap();
        assert!(manager.has_pending().await);

        manager.clear_pending().await;
        assert!(!manager.has_pending().await);
        assert_eq!(manager.active().await.threads, sample().threads);
    }

    #[tokio::test]
    async fn queue_update_rejects_invalid_configuration() {
        let manager = ConfigManager::from_configuration(sample(), "/tmp/does-not-matter.toml");
        let mut invalid = sample();
        invalid.credentials.username.clear();
        assert!(manager.queue_update(invalid).await.is_err());
        assert!(!manager.has_pending().await);
    }

    #[tokio::test]
    async fn persist_writes_file_and_backup_on_second_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let manager = ConfigManager::from_configuration(sample(), &path);
        manager.persist().await.unwrap();
        assert!(tokio::fs::try_exists(&path).await.unwrap());

        manager.persist().await.unwrap();
        let backup = ConfigManager::backup_path(&path);
        assert!(tokio::fs::try_exists(&backup).await.unwrap());
    }
}
