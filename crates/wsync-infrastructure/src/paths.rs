//! Path management for wsync's on-disk files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/wsync/             # Config directory
//! ├── sync.toml                # Engine configuration
//! ├── directories/             # Side-cache, one file per workspace directory
//! │   └── <uuid>.toml
//! └── logs/                    # Application logs
//!     └── wsync_YYYY-MM-DD_HH-MM-SS.log
//! ```

use std::path::{Path, PathBuf};

use wsync_core::{Result, WsyncError};

const APP_DIR: &str = "wsync";

/// Resolves wsync paths, under the platform config directory or an
/// explicit base directory.
#[derive(Debug, Clone)]
pub struct WsyncPaths {
    base: PathBuf,
}

impl WsyncPaths {
    /// Creates a resolver.
    ///
    /// # Arguments
    ///
    /// * `base` - Overrides the platform config directory when `Some`
    ///
    /// # Returns
    ///
    /// - `Err(WsyncError::Config)`: No base given and the platform config
    ///   directory could not be determined
    pub fn new(base: Option<PathBuf>) -> Result<Self> {
        let base = match base {
            Some(base) => base,
            None => dirs::config_dir()
                .ok_or_else(|| WsyncError::config("Cannot find config directory"))?
                .join(APP_DIR),
        };
        Ok(Self { base })
    }

    pub fn config_dir(&self) -> &Path {
        &self.base
    }

    /// Path to `sync.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.base.join("sync.toml")
    }

    /// Directory holding the per-directory side-cache files.
    pub fn side_cache_dir(&self) -> PathBuf {
        self.base.join("directories")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base.join("logs")
    }
}
