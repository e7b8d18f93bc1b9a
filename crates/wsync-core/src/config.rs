use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, WsyncError};

/// Tuning knobs for the sync engine.
///
/// Every field has a default so a partial `sync.toml` is valid.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Resident directory stores allowed before LRU eviction kicks in
    pub max_directory_stores: usize,
    /// Idle time after which an unpinned store is evicted
    pub directory_idle_ttl_secs: u64,
    /// Initial number of root sessions materialized per directory
    pub session_window: usize,
    /// Growth of the session window per `load_more_sessions`
    pub session_window_step: usize,
    /// Roots updated within this window are retained beyond `session_window`
    pub recent_session_window_secs: u64,
    /// Cap on the extra recently-updated roots retained
    pub recent_session_limit: usize,
    /// Messages fetched per history page
    pub message_page_size: usize,
    /// Events drained from the stream per batch
    pub event_batch_size: usize,
    /// Events applied between cooperative yields
    pub event_yield_every: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_directory_stores: 30,
            directory_idle_ttl_secs: 20 * 60,
            session_window: 5,
            session_window_step: 5,
            recent_session_window_secs: 4 * 60 * 60,
            recent_session_limit: 50,
            message_page_size: 100,
            event_batch_size: 256,
            event_yield_every: 64,
        }
    }
}

impl SyncConfig {
    pub fn directory_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_idle_ttl_secs)
    }

    pub fn recent_session_window(&self) -> Duration {
        Duration::from_secs(self.recent_session_window_secs)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_directory_stores == 0 {
            return Err(WsyncError::config("max_directory_stores must be at least 1"));
        }
        if self.session_window == 0 {
            return Err(WsyncError::config("session_window must be at least 1"));
        }
        if self.message_page_size == 0 {
            return Err(WsyncError::config("message_page_size must be at least 1"));
        }
        if self.event_batch_size == 0 {
            return Err(WsyncError::config("event_batch_size must be at least 1"));
        }
        Ok(())
    }
}
