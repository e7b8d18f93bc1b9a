//! Session window loader.
//!
//! Fetches the most recently updated root sessions of a directory, bounded
//! by the store's window, merges them with the resident child sessions and
//! trims the result.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use wsync_core::remote::{SessionListing, SessionQuery};
use wsync_core::session_window::{
    WindowPolicy, estimate_session_total, merge_with_children, trim_sessions,
};
use wsync_core::{DirectoryStore, RemoteApi, Result, StoreChange, now_ms};

use crate::notifier::Notifier;
use crate::registry::DirectoryRegistry;

struct LoaderInner {
    registry: DirectoryRegistry,
    remote: Arc<dyn RemoteApi>,
    notifier: Notifier,
    /// Listings that fell back to an unbounded request
    fallbacks: AtomicU64,
}

/// Loads the root-session window of each directory.
///
/// Concurrent loads of the same directory share one request. A directory
/// is pinned and counted as loading for the whole duration of its load.
#[derive(Clone)]
pub struct SessionWindowLoader {
    inner: Arc<LoaderInner>,
}

impl SessionWindowLoader {
    pub fn new(registry: DirectoryRegistry, remote: Arc<dyn RemoteApi>, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                registry,
                remote,
                notifier,
                fallbacks: AtomicU64::new(0),
            }),
        }
    }

    /// Loads the session window of `directory`.
    ///
    /// When the resident list was already fetched with the current window
    /// size, no request is made and the resident list is only re-trimmed.
    pub async fn load_sessions(&self, directory: &str) -> Result<()> {
        let registry = &self.inner.registry;
        let pin = registry.pin_scoped(directory);
        let this = self.clone();
        let target = directory.to_string();
        registry
            .session_loads()
            .run(directory.to_string(), pin, move || async move {
                this.load_window(&target).await
            })
            .await
    }

    /// Grows the session window by the configured step and loads it.
    pub async fn load_more_sessions(&self, directory: &str) -> Result<()> {
        let step = self.inner.registry.config().session_window_step;
        let handle = self.inner.registry.ensure_child(directory).await;
        handle.mutate(|store| {
            store.limit += step;
            vec![StoreChange::Limit]
        })?;
        tracing::debug!("[SessionLoader] Window of {} grown by {}", directory, step);
        self.load_sessions(directory).await
    }

    /// Number of listings served by the unbounded fallback so far.
    pub fn fallback_count(&self) -> u64 {
        self.inner.fallbacks.load(Ordering::Relaxed)
    }

    async fn load_window(&self, directory: &str) -> Result<()> {
        let handle = self.inner.registry.ensure_child(directory).await;
        let (limit, loaded) = handle.read(|store| (store.limit, store.loaded_limit));
        let policy = self.policy(limit);

        if loaded.is_some_and(|loaded| loaded >= limit) {
            return handle.mutate(|store| {
                let trimmed = trim_sessions(store.sessions.clone(), policy);
                if trimmed == store.sessions {
                    return Vec::new();
                }
                store.sessions = trimmed;
                vec![StoreChange::Sessions]
            });
        }

        let (listing, bounded) = match self.fetch_roots(directory, limit).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.inner
                    .notifier
                    .error(directory, "Failed to load sessions", &e);
                return Err(e);
            }
        };

        let count = listing
            .sessions
            .iter()
            .filter(|s| s.is_root() && !s.is_archived())
            .count();
        let total = estimate_session_total(count, bounded.then_some(limit), listing.total);
        tracing::debug!(
            "[SessionLoader] {} roots fetched for {} (total {})",
            count,
            directory,
            total
        );

        // Fails with Disposed when the store was evicted meanwhile.
        handle.mutate(|store| commit_window(store, listing, total, limit, policy))
    }

    /// Lists roots bounded by `limit`; falls back to an unbounded listing
    /// truncated locally when the bounded one fails.
    ///
    /// The flag is true when the listing was bounded server-side.
    async fn fetch_roots(&self, directory: &str, limit: usize) -> Result<(SessionListing, bool)> {
        let bounded = SessionQuery {
            roots: true,
            limit: Some(limit),
        };
        match self.inner.remote.list_sessions(directory, bounded).await {
            Ok(listing) => Ok((listing, true)),
            Err(e) => {
                self.inner.fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "[SessionLoader] Bounded listing failed for {}, listing all: {}",
                    directory,
                    e
                );
                let unbounded = SessionQuery {
                    roots: true,
                    limit: None,
                };
                let mut listing = self.inner.remote.list_sessions(directory, unbounded).await?;
                let full = listing
                    .sessions
                    .iter()
                    .filter(|s| s.is_root() && !s.is_archived())
                    .count();
                listing.sessions.retain(|s| !s.is_archived());
                listing
                    .sessions
                    .sort_by(|a, b| b.time.updated.cmp(&a.time.updated));
                listing.sessions.truncate(limit);
                listing.total = Some(listing.total.unwrap_or(full));
                Ok((listing, false))
            }
        }
    }

    fn policy(&self, limit: usize) -> WindowPolicy {
        let config = self.inner.registry.config();
        WindowPolicy {
            limit,
            recent_window: config.recent_session_window(),
            recent_limit: config.recent_session_limit,
            now_ms: now_ms(),
        }
    }
}

fn commit_window(
    store: &mut DirectoryStore,
    listing: SessionListing,
    total: usize,
    limit: usize,
    policy: WindowPolicy,
) -> Vec<StoreChange> {
    let mut changes = Vec::new();
    let merged = merge_with_children(listing.sessions, &store.sessions);
    let trimmed = trim_sessions(merged, policy);
    if trimmed != store.sessions {
        store.sessions = trimmed;
        changes.push(StoreChange::Sessions);
    }
    if store.session_total != total {
        store.session_total = total;
        changes.push(StoreChange::SessionTotal);
    }
    store.loaded_limit = Some(limit);
    changes
}
