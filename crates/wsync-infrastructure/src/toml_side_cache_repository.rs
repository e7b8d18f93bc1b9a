//! TOML-based side-cache repository implementation.
//!
//! Stores one file per workspace directory under the side-cache root. File
//! names are UUIDv5 hashes of the directory path, so arbitrary paths map to
//! safe, stable names.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task;
use uuid::Uuid;

use wsync_core::model::DirectoryCache;
use wsync_core::{Result, SideCacheRepository, WsyncError};

use crate::storage::AtomicTomlFile;

/// On-disk layout of one side-cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SideCacheFile {
    /// The workspace directory, kept for humans inspecting the file
    directory: String,
    #[serde(default)]
    cache: DirectoryCache,
}

/// TOML-based side-cache repository.
///
/// # Features
///
/// - **Atomic writes**: Uses tmp file + fsync + atomic rename pattern
/// - **Async-safe**: All file I/O runs in `tokio::task::spawn_blocking`
pub struct TomlSideCacheRepository {
    /// Root directory for side-cache files (typically `~/.config/wsync/directories`)
    root_dir: PathBuf,
}

impl TomlSideCacheRepository {
    pub fn new(root_dir: PathBuf) -> Self {
        Self { root_dir }
    }

    /// Stable file id for a workspace directory.
    pub fn file_id(directory: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, directory.as_bytes())
    }

    fn file_for(&self, directory: &str) -> AtomicTomlFile<SideCacheFile> {
        let name = format!("{}.toml", Self::file_id(directory));
        AtomicTomlFile::new(self.root_dir.join(name))
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| WsyncError::internal(format!("Side-cache task failed: {}", e)))?
}

#[async_trait]
impl SideCacheRepository for TomlSideCacheRepository {
    async fn load(&self, directory: &str) -> Result<Option<DirectoryCache>> {
        let file = self.file_for(directory);
        let stored = blocking(move || file.load()).await?;
        Ok(stored.map(|stored| stored.cache))
    }

    async fn save(&self, directory: &str, record: &DirectoryCache) -> Result<()> {
        let file = self.file_for(directory);
        let contents = SideCacheFile {
            directory: directory.to_string(),
            cache: record.clone(),
        };
        blocking(move || file.save(&contents)).await?;
        tracing::debug!("[SideCache] Saved record for {}", directory);
        Ok(())
    }

    async fn remove(&self, directory: &str) -> Result<()> {
        let file = self.file_for(directory);
        blocking(move || file.remove()).await
    }
}
