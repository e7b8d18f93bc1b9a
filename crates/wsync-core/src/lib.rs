//! Domain layer for the workspace state sync engine.
//!
//! This crate holds the data containers, the pure reducer and eviction
//! policy, and the interfaces to the remote API and the durable side-cache.
//! Nothing here performs I/O.

pub mod config;
pub mod error;
pub mod event;
pub mod eviction;
pub mod model;
pub mod optimistic;
pub mod reducer;
pub mod remote;
pub mod session_window;
pub mod side_cache;
pub mod sorted;
pub mod store;

// Re-export common types
pub use config::SyncConfig;
pub use error::{Result, WsyncError};
pub use event::{DirectoryEvent, GLOBAL_DIRECTORY, SyncEvent};
pub use remote::RemoteApi;
pub use side_cache::SideCacheRepository;
pub use store::{DirectoryStore, GlobalStore, StoreChange, StoreStatus};

/// Current time in milliseconds since the UNIX epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
