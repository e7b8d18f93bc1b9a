//! Bootstrap and refresh coordination.
//!
//! `bootstrap_instance` populates one directory store from the remote API.
//! Refresh requests arriving while a global config reload is in flight are
//! queued and flushed once, after the reload settles.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use wsync_core::model::{PermissionRequest, QuestionRequest};
use wsync_core::sorted;
use wsync_core::{GLOBAL_DIRECTORY, RemoteApi, Result, StoreChange, StoreStatus};

use crate::handle::StoreHandle;
use crate::loader::SessionWindowLoader;
use crate::notifier::Notifier;
use crate::registry::DirectoryRegistry;

#[derive(Debug, Default)]
struct RefreshQueue {
    /// Config reloads in flight
    reloads: usize,
    /// Directories whose refresh was deferred
    pending: BTreeSet<String>,
    /// A full refresh was deferred
    refresh_all: bool,
}

struct CoordinatorInner {
    registry: DirectoryRegistry,
    remote: Arc<dyn RemoteApi>,
    loader: SessionWindowLoader,
    notifier: Notifier,
    queue: Mutex<RefreshQueue>,
}

/// Populates directory stores and the global store.
#[derive(Clone)]
pub struct BootstrapCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl BootstrapCoordinator {
    pub fn new(
        registry: DirectoryRegistry,
        remote: Arc<dyn RemoteApi>,
        loader: SessionWindowLoader,
        notifier: Notifier,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                registry,
                remote,
                loader,
                notifier,
                queue: Mutex::new(RefreshQueue::default()),
            }),
        }
    }

    /// Populates the store of `directory`.
    ///
    /// Fetches project, providers, config, session statuses, vcs, pending
    /// permissions and questions and LSP status, loads the session window,
    /// then marks the store `Complete`. Concurrent calls for the same
    /// directory share one bootstrap. The directory is pinned throughout.
    ///
    /// On failure the store stays `Loading` and a notice is sent.
    pub async fn bootstrap_instance(&self, directory: &str) -> Result<()> {
        let registry = &self.inner.registry;
        let pin = registry.pin_scoped(directory);
        let this = self.clone();
        let target = directory.to_string();
        registry
            .bootstraps()
            .run(directory.to_string(), pin, move || async move {
                this.populate(&target).await
            })
            .await
    }

    /// Loads the project list into the global store and marks it ready.
    pub async fn bootstrap_global(&self) -> Result<()> {
        let this = self.clone();
        self.inner
            .registry
            .bootstraps()
            .run(GLOBAL_DIRECTORY.to_string(), (), move || async move {
                this.populate_global().await
            })
            .await
    }

    /// Re-bootstraps `directory`, or queues it while a config reload runs.
    pub async fn push(&self, directory: &str) {
        {
            let mut queue = self.lock_queue();
            if queue.reloads > 0 {
                tracing::debug!("[Bootstrap] Deferring refresh of {}", directory);
                queue.pending.insert(directory.to_string());
                return;
            }
        }
        self.refresh_directory(directory).await;
    }

    /// Re-bootstraps the global store and every resident directory, or
    /// queues a full refresh while a config reload runs.
    pub async fn refresh(&self) {
        {
            let mut queue = self.lock_queue();
            if queue.reloads > 0 {
                tracing::debug!("[Bootstrap] Deferring full refresh");
                queue.refresh_all = true;
                return;
            }
        }
        self.refresh_all().await;
    }

    /// True while a global config reload is in flight.
    pub fn is_paused(&self) -> bool {
        self.lock_queue().reloads > 0
    }

    /// Replaces the global configuration.
    ///
    /// Refreshes requested while the update runs are held back and flushed
    /// exactly once afterwards: a full refresh when one was requested,
    /// otherwise each deferred directory once.
    pub async fn reload_global_config(&self, config: serde_json::Value) -> Result<()> {
        self.lock_queue().reloads += 1;
        tracing::info!("[Bootstrap] Reloading global config");

        let result = self.inner.remote.update_global_config(config).await;
        if let Err(e) = &result {
            self.inner
                .notifier
                .error(GLOBAL_DIRECTORY, "Failed to update config", e);
        }

        let (refresh_all, pending) = {
            let mut queue = self.lock_queue();
            queue.reloads = queue.reloads.saturating_sub(1);
            if queue.reloads > 0 {
                return result;
            }
            (
                std::mem::take(&mut queue.refresh_all),
                std::mem::take(&mut queue.pending),
            )
        };

        if refresh_all {
            self.refresh_all().await;
        } else {
            join_all(pending.iter().map(|dir| self.refresh_directory(dir))).await;
        }
        result
    }

    async fn refresh_directory(&self, directory: &str) {
        if !self.inner.registry.is_resident(directory) {
            tracing::debug!("[Bootstrap] Skipping refresh of non-resident {}", directory);
            return;
        }
        // Failures were already reported by `populate`.
        let _ = self.bootstrap_instance(directory).await;
    }

    async fn refresh_all(&self) {
        tracing::info!("[Bootstrap] Refreshing every directory");
        if let Err(e) = self.bootstrap_global().await {
            tracing::warn!("[Bootstrap] Global refresh failed: {}", e);
        }
        let dirs = self.inner.registry.directories();
        join_all(dirs.iter().map(|dir| self.refresh_directory(dir))).await;
    }

    async fn populate(&self, directory: &str) -> Result<()> {
        let handle = self.inner.registry.ensure_child(directory).await;
        tracing::info!("[Bootstrap] Loading {}", directory);

        match self.fetch_and_seed(&handle).await {
            Ok(()) => {
                tracing::info!("[Bootstrap] {} ready", directory);
                Ok(())
            }
            Err(e) if e.is_disposed() => {
                tracing::debug!("[Bootstrap] {} disposed while loading", directory);
                Err(e)
            }
            Err(e) => {
                self.inner
                    .notifier
                    .error(directory, "Failed to load workspace", &e);
                Err(e)
            }
        }
    }

    async fn fetch_and_seed(&self, handle: &Arc<StoreHandle>) -> Result<()> {
        let directory = handle.directory();
        let remote = &self.inner.remote;
        let (project, providers, config, statuses, vcs, permissions, questions, lsp) = futures::try_join!(
            remote.current_project(directory),
            remote.providers(directory),
            remote.config(directory),
            remote.session_statuses(directory),
            remote.vcs(directory),
            remote.pending_permissions(directory),
            remote.pending_questions(directory),
            remote.lsp_status(directory),
        )?;

        let vcs_changed = handle.update(|store| {
            let mut changes = vec![StoreChange::Bootstrap];
            store.project = Some(project.id.clone());
            store.providers = providers;
            store.config = config;
            store.session_status = statuses;
            store.permission = group_permissions(permissions);
            store.question = group_questions(questions);
            // Forces the session window below to refetch instead of re-trimming.
            store.loaded_limit = None;
            if store.lsp != lsp {
                store.lsp = lsp;
                changes.push(StoreChange::Lsp);
            }
            let vcs_changed = vcs.is_some() && store.vcs != vcs;
            if vcs_changed {
                store.vcs = vcs;
                changes.push(StoreChange::Vcs);
            }
            (vcs_changed, changes)
        })?;
        self.inner
            .registry
            .update_global(|global| global.upsert_project(project));

        self.inner.loader.load_sessions(directory).await?;

        handle.mutate(|store| {
            store.status = StoreStatus::Complete;
            vec![StoreChange::Bootstrap]
        })?;

        if vcs_changed && let Err(e) = self.inner.registry.persist(directory).await {
            tracing::warn!("[Bootstrap] Failed to persist side-cache for {}: {}", directory, e);
        }
        Ok(())
    }

    async fn populate_global(&self) -> Result<()> {
        let projects = match self.inner.remote.list_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                self.inner
                    .notifier
                    .error(GLOBAL_DIRECTORY, "Failed to load projects", &e);
                return Err(e);
            }
        };
        tracing::info!("[Bootstrap] {} projects loaded", projects.len());
        self.inner.registry.update_global(|global| {
            global.replace_projects(projects);
            global.ready = true;
        });
        Ok(())
    }

    fn lock_queue(&self) -> MutexGuard<'_, RefreshQueue> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn group_permissions(requests: Vec<PermissionRequest>) -> HashMap<String, Vec<PermissionRequest>> {
    let mut grouped: HashMap<String, Vec<PermissionRequest>> = HashMap::new();
    for request in requests {
        let list = grouped.entry(request.session_id.clone()).or_default();
        sorted::upsert(list, request);
    }
    grouped
}

fn group_questions(requests: Vec<QuestionRequest>) -> HashMap<String, Vec<QuestionRequest>> {
    let mut grouped: HashMap<String, Vec<QuestionRequest>> = HashMap::new();
    for request in requests {
        let list = grouped.entry(request.session_id.clone()).or_default();
        sorted::upsert(list, request);
    }
    grouped
}
