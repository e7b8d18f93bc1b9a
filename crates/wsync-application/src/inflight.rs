//! Keyed de-duplication of in-flight loads.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use wsync_core::{Result, WsyncError};

/// A load every concurrent caller for the same key awaits.
pub type SharedLoad<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Table of running loads, one per key.
///
/// A second request for a key that is already loading joins the existing
/// load instead of starting another. The entry is removed once the load
/// settles, success or failure, so the next request starts fresh.
pub struct InflightTable<K, T = ()> {
    entries: Mutex<HashMap<K, SharedLoad<T>>>,
}

impl<K, T> InflightTable<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Joins the load for `key`, starting it with `start` when none runs.
    ///
    /// The load runs on its own task, so it settles even when every caller
    /// stops awaiting it. `guard` is held until the entry is removed, then
    /// dropped. Callers pass a pin so the target stays resident for the
    /// whole load. When an existing load is joined the guard is dropped
    /// immediately.
    pub fn run<G, F, Fut>(self: &Arc<Self>, key: K, guard: G, start: F) -> SharedLoad<T>
    where
        G: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&key) {
            let existing = existing.clone();
            drop(entries);
            drop(guard);
            return existing;
        }

        let table = Arc::downgrade(self);
        let settled = key.clone();
        let work = start();
        // The task cannot settle before the entry is inserted: `settle`
        // waits on the lock held here.
        let task = tokio::spawn(async move {
            let result = work.await;
            if let Some(table) = table.upgrade() {
                table.settle(&settled);
            }
            // Released after the entry is gone so "loading" is already false.
            drop(guard);
            result
        });
        let load = async move {
            task.await
                .map_err(|e| WsyncError::internal(format!("Load task failed: {}", e)))?
        }
        .boxed()
        .shared();

        entries.insert(key, load.clone());
        load
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn settle(&self, key: &K) {
        self.lock().remove(key);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, SharedLoad<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
