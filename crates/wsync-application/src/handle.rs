//! Shared handle to one resident directory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use wsync_core::model::{Message, Part};
use wsync_core::reducer::{self, Effect};
use wsync_core::{DirectoryStore, Result, StoreChange, SyncEvent, WsyncError, optimistic};

const CHANGE_BUFFER: usize = 1024;

/// A resident [`DirectoryStore`] plus its change feed.
///
/// Every mutation goes through [`StoreHandle::update`], which refuses to
/// touch a disposed store. Async completions therefore never write into a
/// store that was evicted while they were in flight.
#[derive(Debug)]
pub struct StoreHandle {
    directory: String,
    state: Mutex<DirectoryStore>,
    changes: broadcast::Sender<StoreChange>,
    disposed: AtomicBool,
}

impl StoreHandle {
    pub(crate) fn new(store: DirectoryStore) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            directory: store.directory.clone(),
            state: Mutex::new(store),
            changes,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Subscribes to the sub-paths touched by future mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub fn read<R>(&self, f: impl FnOnce(&DirectoryStore) -> R) -> R {
        f(&self.lock())
    }

    /// A point-in-time copy of the store.
    pub fn snapshot(&self) -> DirectoryStore {
        self.lock().clone()
    }

    /// Runs `f` against the store and publishes the changes it reports.
    ///
    /// # Returns
    ///
    /// * `Err(WsyncError::Disposed)` - The store was evicted; `f` did not run
    pub fn update<R>(&self, f: impl FnOnce(&mut DirectoryStore) -> (R, Vec<StoreChange>)) -> Result<R> {
        let (result, changes) = {
            let mut store = self.lock();
            if self.is_disposed() {
                return Err(WsyncError::disposed(&self.directory));
            }
            f(&mut store)
        };
        self.publish(changes);
        Ok(result)
    }

    /// [`StoreHandle::update`] for closures that only report changes.
    pub fn mutate(&self, f: impl FnOnce(&mut DirectoryStore) -> Vec<StoreChange>) -> Result<()> {
        self.update(|store| ((), f(store)))
    }

    /// Reduces one event into the store.
    pub fn apply(&self, event: &SyncEvent) -> Result<Option<Effect>> {
        self.update(|store| {
            let reduction = reducer::apply(store, event);
            (reduction.effect, reduction.changes)
        })
    }

    /// Inserts a not-yet-confirmed message with its parts.
    pub fn optimistic_add(&self, session_id: &str, message: Message, parts: Vec<Part>) -> Result<()> {
        self.mutate(|store| optimistic::add(store, session_id, message, parts))
    }

    /// Rolls back an optimistic message.
    pub fn optimistic_remove(&self, session_id: &str, message_id: &str) -> Result<()> {
        self.mutate(|store| optimistic::remove(store, session_id, message_id))
    }

    fn publish(&self, changes: Vec<StoreChange>) {
        let mut seen: Vec<StoreChange> = Vec::with_capacity(changes.len());
        for change in changes {
            if seen.contains(&change) {
                continue;
            }
            // No subscribers is fine.
            let _ = self.changes.send(change.clone());
            seen.push(change);
        }
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryStore> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
