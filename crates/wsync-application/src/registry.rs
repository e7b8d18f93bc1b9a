//! Directory store registry.
//!
//! Owns the map of resident stores, their access marks and pin counts, and
//! the in-flight load tables. Every access mark, pin and unpin runs an
//! eviction sweep.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use wsync_core::eviction::{self, EvictionInput};
use wsync_core::model::{DirectoryCache, ProjectMeta, ProjectMetaPatch};
use wsync_core::{
    DirectoryStore, GlobalStore, Result, SideCacheRepository, StoreChange, SyncConfig,
};

use crate::handle::StoreHandle;
use crate::inflight::InflightTable;

#[derive(Default)]
struct RegistryState {
    stores: HashMap<String, Arc<StoreHandle>>,
    last_access: HashMap<String, Instant>,
    pins: HashMap<String, usize>,
    /// Most recent access mark handed out
    last_mark: Option<Instant>,
}

impl RegistryState {
    /// Strictly increasing access marks, so LRU order never ties.
    fn next_mark(&mut self) -> Instant {
        let mut now = Instant::now();
        if let Some(prev) = self.last_mark
            && now <= prev
        {
            now = prev + Duration::from_nanos(1);
        }
        self.last_mark = Some(now);
        now
    }
}

struct RegistryInner {
    config: SyncConfig,
    side_cache: Arc<dyn SideCacheRepository>,
    state: Mutex<RegistryState>,
    global: Mutex<GlobalStore>,
    bootstraps: Arc<InflightTable<String>>,
    session_loads: Arc<InflightTable<String>>,
}

/// Registry of resident directory stores.
///
/// Cloning is cheap; every clone shares the same state.
#[derive(Clone)]
pub struct DirectoryRegistry {
    inner: Arc<RegistryInner>,
}

impl DirectoryRegistry {
    /// Creates an empty registry.
    ///
    /// # Arguments
    ///
    /// * `config` - Capacity, idle TTL and session window size
    /// * `side_cache` - Durable per-directory records used to seed new stores
    pub fn new(config: SyncConfig, side_cache: Arc<dyn SideCacheRepository>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                side_cache,
                state: Mutex::new(RegistryState::default()),
                global: Mutex::new(GlobalStore::default()),
                bootstraps: InflightTable::new(),
                session_loads: InflightTable::new(),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// The resident store for `directory`, without marking access.
    pub fn get(&self, directory: &str) -> Option<Arc<StoreHandle>> {
        self.lock_state().stores.get(directory).cloned()
    }

    pub fn is_resident(&self, directory: &str) -> bool {
        self.lock_state().stores.contains_key(directory)
    }

    /// Every resident directory, sorted.
    pub fn directories(&self) -> Vec<String> {
        let mut dirs: Vec<String> = self.lock_state().stores.keys().cloned().collect();
        dirs.sort();
        dirs
    }

    pub fn len(&self) -> usize {
        self.lock_state().stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().stores.is_empty()
    }

    /// Returns the store for `directory`, creating it when absent.
    ///
    /// A new store starts in `Loading` state, seeded from the side-cache.
    /// Either way the directory is marked as accessed and a sweep runs that
    /// never evicts `directory` itself.
    pub async fn ensure_child(&self, directory: &str) -> Arc<StoreHandle> {
        if let Some(handle) = self.get(directory) {
            self.mark(directory);
            return handle;
        }

        let cache = match self.inner.side_cache.load(directory).await {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("[Registry] Failed to read side-cache for {}: {}", directory, e);
                DirectoryCache::default()
            }
        };

        let handle = {
            let mut state = self.lock_state();
            // Another caller may have created it while the cache was loading.
            state
                .stores
                .entry(directory.to_string())
                .or_insert_with(|| {
                    tracing::debug!("[Registry] Creating store for {}", directory);
                    Arc::new(StoreHandle::new(DirectoryStore::new(
                        directory,
                        self.inner.config.session_window,
                        cache,
                    )))
                })
                .clone()
        };
        self.mark(directory);
        handle
    }

    /// Returns the store for `directory` together with a pin that keeps it
    /// resident until the lease is dropped.
    pub async fn child(&self, directory: &str) -> StoreLease {
        let pin = self.pin_scoped(directory);
        let handle = self.ensure_child(directory).await;
        StoreLease { handle, _pin: pin }
    }

    /// Increments the pin count of `directory`. Pair with [`Self::unpin`].
    pub fn pin(&self, directory: &str) {
        {
            let mut state = self.lock_state();
            *state.pins.entry(directory.to_string()).or_default() += 1;
        }
        self.sweep(Some(directory));
    }

    /// Decrements the pin count of `directory` and sweeps.
    pub fn unpin(&self, directory: &str) {
        {
            let mut state = self.lock_state();
            if let Some(count) = state.pins.get_mut(directory) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    state.pins.remove(directory);
                }
            }
        }
        self.sweep(None);
    }

    /// Pins `directory` until the returned guard is dropped.
    pub fn pin_scoped(&self, directory: &str) -> PinGuard {
        self.pin(directory);
        PinGuard {
            registry: self.clone(),
            directory: directory.to_string(),
        }
    }

    pub fn pin_count(&self, directory: &str) -> usize {
        self.lock_state().pins.get(directory).copied().unwrap_or(0)
    }

    /// True while a bootstrap or session load targets `directory`.
    pub fn is_loading(&self, directory: &str) -> bool {
        let key = directory.to_string();
        self.inner.bootstraps.contains(&key) || self.inner.session_loads.contains(&key)
    }

    pub fn is_bootstrapping(&self, directory: &str) -> bool {
        self.inner.bootstraps.contains(&directory.to_string())
    }

    /// Whether `directory` may be disposed right now.
    pub fn can_dispose(&self, directory: &str) -> bool {
        let state = self.lock_state();
        self.disposable(&state, directory)
    }

    /// Disposes the store for `directory`.
    ///
    /// Returns false, without doing anything, when the store is absent,
    /// pinned or loading.
    pub fn dispose(&self, directory: &str) -> bool {
        let handle = {
            let mut state = self.lock_state();
            self.take_store(&mut state, directory)
        };
        match handle {
            Some(handle) => {
                handle.dispose();
                tracing::info!("[Registry] Disposed store for {}", directory);
                true
            }
            None => false,
        }
    }

    /// Merges `patch` into the project metadata of `directory`.
    ///
    /// The durable record is updated even when the store is not resident.
    pub async fn project_meta(&self, directory: &str, patch: &ProjectMetaPatch) -> Result<ProjectMeta> {
        let mut record = self.durable_record(directory).await?;
        let mut meta = record.meta.clone().unwrap_or_default();
        if !meta.merge(patch) {
            return Ok(meta);
        }
        record.meta = Some(meta.clone());

        if let Some(handle) = self.get(directory) {
            let merged = meta.clone();
            // A store disposed meanwhile still gets the durable write below.
            let _ = handle.mutate(|store| {
                store.project_meta = Some(merged);
                vec![StoreChange::ProjectMeta]
            });
        }
        self.inner.side_cache.save(directory, &record).await?;
        Ok(meta)
    }

    /// Sets or clears the project icon of `directory`.
    pub async fn project_icon(&self, directory: &str, icon: Option<String>) -> Result<()> {
        let mut record = self.durable_record(directory).await?;
        if record.icon == icon {
            return Ok(());
        }
        record.icon = icon.clone();

        if let Some(handle) = self.get(directory) {
            let _ = handle.mutate(|store| {
                store.icon = icon;
                vec![StoreChange::Icon]
            });
        }
        self.inner.side_cache.save(directory, &record).await
    }

    /// Writes the durable fields of the resident store to the side-cache.
    pub async fn persist(&self, directory: &str) -> Result<()> {
        let Some(handle) = self.get(directory) else {
            return Ok(());
        };
        let record = handle.read(DirectoryStore::durable_record);
        self.inner.side_cache.save(directory, &record).await
    }

    pub fn global_snapshot(&self) -> GlobalStore {
        self.lock_global().clone()
    }

    pub fn update_global<R>(&self, f: impl FnOnce(&mut GlobalStore) -> R) -> R {
        f(&mut self.lock_global())
    }

    pub(crate) fn bootstraps(&self) -> &Arc<InflightTable<String>> {
        &self.inner.bootstraps
    }

    pub(crate) fn session_loads(&self) -> &Arc<InflightTable<String>> {
        &self.inner.session_loads
    }

    /// Live record when resident, durable record otherwise.
    async fn durable_record(&self, directory: &str) -> Result<DirectoryCache> {
        if let Some(handle) = self.get(directory) {
            return Ok(handle.read(DirectoryStore::durable_record));
        }
        Ok(self.inner.side_cache.load(directory).await?.unwrap_or_default())
    }

    fn mark(&self, directory: &str) {
        {
            let mut state = self.lock_state();
            if state.stores.contains_key(directory) {
                let at = state.next_mark();
                state.last_access.insert(directory.to_string(), at);
            }
        }
        self.sweep(Some(directory));
    }

    fn sweep(&self, skip: Option<&str>) {
        let evicted: Vec<Arc<StoreHandle>> = {
            let mut state = self.lock_state();
            let stores: Vec<String> = state.stores.keys().cloned().collect();
            let protected: HashSet<String> = stores
                .iter()
                .filter(|dir| state.pins.get(*dir).copied().unwrap_or(0) > 0 || self.is_loading(dir))
                .cloned()
                .collect();
            let picked = eviction::pick_to_evict(EvictionInput {
                stores: &stores,
                last_access: &state.last_access,
                protected: &protected,
                max: self.inner.config.max_directory_stores,
                ttl: self.inner.config.directory_idle_ttl(),
                now: Instant::now().max(state.last_mark.unwrap_or_else(Instant::now)),
                skip,
            });
            picked
                .iter()
                .filter_map(|dir| self.take_store(&mut state, dir))
                .collect()
        };

        for handle in evicted {
            handle.dispose();
            tracing::info!("[Registry] Evicted store for {}", handle.directory());
        }
    }

    fn disposable(&self, state: &RegistryState, directory: &str) -> bool {
        eviction::can_dispose(
            state.stores.contains_key(directory),
            state.pins.get(directory).copied().unwrap_or(0),
            self.is_loading(directory),
        )
    }

    fn take_store(&self, state: &mut RegistryState, directory: &str) -> Option<Arc<StoreHandle>> {
        if !self.disposable(state, directory) {
            return None;
        }
        state.last_access.remove(directory);
        state.pins.remove(directory);
        state.stores.remove(directory)
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_global(&self) -> MutexGuard<'_, GlobalStore> {
        self.inner.global.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped pin on a directory; unpins on drop.
pub struct PinGuard {
    registry: DirectoryRegistry,
    directory: String,
}

impl PinGuard {
    pub fn directory(&self) -> &str {
        &self.directory
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.registry.unpin(&self.directory);
    }
}

/// A pinned store returned by [`DirectoryRegistry::child`].
pub struct StoreLease {
    handle: Arc<StoreHandle>,
    _pin: PinGuard,
}

impl StoreLease {
    pub fn handle(&self) -> &Arc<StoreHandle> {
        &self.handle
    }
}

impl Deref for StoreLease {
    type Target = StoreHandle;

    fn deref(&self) -> &StoreHandle {
        &self.handle
    }
}
