//! Per-session message history.
//!
//! Messages are paged in from the most recent end. `sync` materializes a
//! session the first time it is opened; `load_more` extends its window.

use std::sync::Arc;

use wsync_core::model::MessageWithParts;
use wsync_core::store::MessageWindow;
use wsync_core::{DirectoryStore, RemoteApi, Result, StoreChange, SyncEvent, WsyncError, reducer};

use crate::handle::StoreHandle;
use crate::inflight::InflightTable;
use crate::notifier::Notifier;
use crate::registry::DirectoryRegistry;

type SessionKey = (String, String);

struct HistoryInner {
    registry: DirectoryRegistry,
    remote: Arc<dyn RemoteApi>,
    notifier: Notifier,
    pages: Arc<InflightTable<SessionKey, bool>>,
    syncs: Arc<InflightTable<SessionKey>>,
}

/// Message history loader, de-duplicated per `(directory, session)`.
#[derive(Clone)]
pub struct MessageHistory {
    inner: Arc<HistoryInner>,
}

impl MessageHistory {
    pub fn new(registry: DirectoryRegistry, remote: Arc<dyn RemoteApi>, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(HistoryInner {
                registry,
                remote,
                notifier,
                pages: InflightTable::new(),
                syncs: InflightTable::new(),
            }),
        }
    }

    /// Extends the message window of a session by `count` messages
    /// (the configured page size when `None`).
    ///
    /// The directory is pinned while the page loads.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Older messages remain on the server
    /// * `Ok(false)` - The whole history is resident
    /// * `Err(WsyncError::Disposed)` - The directory has no open store
    pub async fn load_more(&self, directory: &str, session_id: &str, count: Option<usize>) -> Result<bool> {
        let count = count.unwrap_or(self.inner.registry.config().message_page_size);
        let key = (directory.to_string(), session_id.to_string());
        let pin = self.inner.registry.pin_scoped(directory);
        let this = self.clone();
        let (dir, sid) = key.clone();
        self.inner
            .pages
            .run(key, pin, move || async move { this.fetch_page(&dir, &sid, count).await })
            .await
    }

    /// Materializes a session: its info, latest messages, diff and todo.
    ///
    /// A session already synced is left alone.
    pub async fn sync(&self, directory: &str, session_id: &str) -> Result<()> {
        let key = (directory.to_string(), session_id.to_string());
        let pin = self.inner.registry.pin_scoped(directory);
        let this = self.clone();
        let (dir, sid) = key.clone();
        self.inner
            .syncs
            .run(key, pin, move || async move { this.sync_session(&dir, &sid).await })
            .await
    }

    /// True while a page load for the session is running.
    pub fn is_loading(&self, directory: &str, session_id: &str) -> bool {
        self.inner
            .pages
            .contains(&(directory.to_string(), session_id.to_string()))
    }

    /// History only fills stores that are open; an evicted store is not
    /// recreated just to hold messages.
    fn resident(&self, directory: &str) -> Result<Arc<StoreHandle>> {
        self.inner.registry.get(directory).ok_or_else(|| {
            tracing::debug!("[History] {} is not resident", directory);
            WsyncError::disposed(directory)
        })
    }

    async fn fetch_page(&self, directory: &str, session_id: &str, count: usize) -> Result<bool> {
        let handle = self.resident(directory)?;
        let current = handle.read(|store| store.message_window.get(session_id).copied());
        if current.is_some_and(|window| window.complete) {
            return Ok(false);
        }

        let limit = current.map(|window| window.limit).unwrap_or(0) + count;
        let page = match self.inner.remote.messages(directory, session_id, limit).await {
            Ok(page) => page,
            Err(e) => {
                self.inner
                    .notifier
                    .error(directory, "Failed to load messages", &e);
                return Err(e);
            }
        };
        let window = MessageWindow {
            limit,
            complete: page.len() < limit,
        };
        tracing::debug!(
            "[History] {} messages of {} loaded (complete: {})",
            page.len(),
            session_id,
            window.complete
        );

        handle.mutate(|store| commit_page(store, session_id, page, window))?;
        Ok(!window.complete)
    }

    async fn sync_session(&self, directory: &str, session_id: &str) -> Result<()> {
        let handle = self.resident(directory)?;
        if handle.read(|store| store.message_window.contains_key(session_id)) {
            return Ok(());
        }

        let remote = &self.inner.remote;
        let limit = self.inner.registry.config().message_page_size;
        let fetched = futures::try_join!(
            remote.get_session(directory, session_id),
            remote.messages(directory, session_id, limit),
            remote.session_diff(directory, session_id),
            remote.session_todo(directory, session_id),
        );
        let (session, page, diff, todos) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                self.inner
                    .notifier
                    .error(directory, "Failed to load session", &e);
                return Err(e);
            }
        };
        let window = MessageWindow {
            limit,
            complete: page.len() < limit,
        };

        let archived = session.is_archived();
        handle.mutate(|store| {
            let sid = session_id.to_string();
            let mut changes = reducer::apply(store, &SyncEvent::SessionUpdated { info: session }).changes;
            if archived {
                return changes;
            }
            changes.extend(
                reducer::apply(
                    store,
                    &SyncEvent::SessionDiff {
                        session_id: sid.clone(),
                        diff,
                    },
                )
                .changes,
            );
            changes.extend(
                reducer::apply(
                    store,
                    &SyncEvent::TodoUpdated {
                        session_id: sid,
                        todos,
                    },
                )
                .changes,
            );
            changes.extend(commit_page(store, session_id, page, window));
            changes
        })
    }
}

fn commit_page(
    store: &mut DirectoryStore,
    session_id: &str,
    page: Vec<MessageWithParts>,
    window: MessageWindow,
) -> Vec<StoreChange> {
    let mut changes = Vec::new();
    store.messages.entry(session_id.to_string()).or_default();
    for entry in page {
        let message = SyncEvent::MessageUpdated { info: entry.info };
        changes.extend(reducer::apply(store, &message).changes);
        for part in entry.parts {
            changes.extend(reducer::apply(store, &SyncEvent::MessagePartUpdated { part }).changes);
        }
    }
    store.message_window.insert(session_id.to_string(), window);
    changes
}
