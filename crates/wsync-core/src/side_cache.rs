//! Durable side-cache repository trait.
//!
//! The side-cache holds the small per-directory record (vcs branch, project
//! metadata, icon) that survives store eviction, so a re-created store can
//! render immediately.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::DirectoryCache;

/// Repository for per-directory durable records.
///
/// # Implementation Notes
///
/// Implementations should:
/// - Return `Ok(None)` for directories never written
/// - Make `save` atomic with respect to concurrent readers
#[async_trait]
pub trait SideCacheRepository: Send + Sync {
    /// Loads the record for `directory`.
    async fn load(&self, directory: &str) -> Result<Option<DirectoryCache>>;

    /// Writes the record for `directory`, replacing any previous one.
    async fn save(&self, directory: &str, record: &DirectoryCache) -> Result<()>;

    /// Deletes the record for `directory` (no-op when absent).
    async fn remove(&self, directory: &str) -> Result<()>;
}
