//! Configuration service implementation.
//!
//! Loads [`SyncConfig`] from `sync.toml`, writing the defaults on first run.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use wsync_core::{Result, SyncConfig};

use crate::storage::AtomicTomlFile;

/// Loads and caches the engine configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    file: AtomicTomlFile<SyncConfig>,
    /// Cached configuration; `None` until first load or after invalidation
    config: Arc<RwLock<Option<SyncConfig>>>,
}

impl ConfigService {
    /// Creates a service reading `path` (usually `WsyncPaths::config_file`).
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: AtomicTomlFile::new(path),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the configuration, loading it from disk if not cached.
    ///
    /// A missing file is created with the defaults. An invalid file is an
    /// error rather than a silent fallback.
    pub fn get_config(&self) -> Result<SyncConfig> {
        if let Some(cached) = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(cached.clone());
        }

        let loaded = self.load()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(loaded.clone());
        Ok(loaded)
    }

    /// Validates and writes `config`, replacing the cache.
    pub fn save(&self, config: &SyncConfig) -> Result<()> {
        config.validate()?;
        self.file.save(config)?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        Ok(())
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn load(&self) -> Result<SyncConfig> {
        match self.file.load()? {
            Some(config) => {
                config.validate()?;
                tracing::debug!("[ConfigService] Loaded {}", self.file.path().display());
                Ok(config)
            }
            None => {
                let config = SyncConfig::default();
                self.file.save(&config)?;
                tracing::info!(
                    "[ConfigService] Created default config at {}",
                    self.file.path().display()
                );
                Ok(config)
            }
        }
    }
}
