//! Application layer for the workspace state sync engine.
//!
//! This crate wires the pure domain pieces of `wsync-core` into running
//! services: the store registry with its eviction sweeps, de-duplicated
//! loaders, the bootstrap coordinator and the event dispatcher.

pub mod actions;
pub mod bootstrap;
pub mod dispatcher;
pub mod handle;
pub mod history;
pub mod inflight;
pub mod loader;
pub mod notifier;
pub mod registry;

pub use actions::SessionActions;
pub use bootstrap::BootstrapCoordinator;
pub use dispatcher::EventDispatcher;
pub use handle::StoreHandle;
pub use history::MessageHistory;
pub use loader::SessionWindowLoader;
pub use notifier::{NoticeLevel, Notifier, SyncNotice};
pub use registry::{DirectoryRegistry, PinGuard, StoreLease};

use std::sync::Arc;

use futures::Stream;
use wsync_core::{DirectoryEvent, RemoteApi, SideCacheRepository, SyncConfig};

/// The assembled sync engine.
///
/// Cloning is cheap; every clone drives the same registry.
#[derive(Clone)]
pub struct WorkspaceSync {
    registry: DirectoryRegistry,
    loader: SessionWindowLoader,
    history: MessageHistory,
    coordinator: BootstrapCoordinator,
    dispatcher: EventDispatcher,
    actions: SessionActions,
}

impl WorkspaceSync {
    /// Builds every service around one registry.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine tuning; see [`SyncConfig`]
    /// * `remote` - Client for the assistant server
    /// * `side_cache` - Durable per-directory records
    /// * `notifier` - Receives failures of background loads
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteApi>,
        side_cache: Arc<dyn SideCacheRepository>,
        notifier: Notifier,
    ) -> Self {
        let registry = DirectoryRegistry::new(config, side_cache);
        let loader = SessionWindowLoader::new(registry.clone(), remote.clone(), notifier.clone());
        let history = MessageHistory::new(registry.clone(), remote.clone(), notifier.clone());
        let coordinator = BootstrapCoordinator::new(
            registry.clone(),
            remote.clone(),
            loader.clone(),
            notifier.clone(),
        );
        let dispatcher = EventDispatcher::new(registry.clone(), coordinator.clone(), remote.clone());
        let actions = SessionActions::new(registry.clone(), remote, notifier);

        Self {
            registry,
            loader,
            history,
            coordinator,
            dispatcher,
            actions,
        }
    }

    /// Opens the store of `directory`, pinned for the lifetime of the lease.
    ///
    /// With `bootstrap`, a store that is not yet `Complete` is populated in
    /// the background; the lease is returned immediately either way.
    pub async fn child(&self, directory: &str, bootstrap: bool) -> StoreLease {
        let lease = self.registry.child(directory).await;
        if bootstrap && !lease.read(|store| store.is_complete()) && !self.registry.is_bootstrapping(directory) {
            let coordinator = self.coordinator.clone();
            let target = directory.to_string();
            tokio::spawn(async move {
                // Failures reach the notifier.
                let _ = coordinator.bootstrap_instance(&target).await;
            });
        }
        lease
    }

    pub async fn bootstrap_global(&self) -> wsync_core::Result<()> {
        self.coordinator.bootstrap_global().await
    }

    pub async fn dispatch(&self, event: DirectoryEvent) {
        self.dispatcher.dispatch(event).await
    }

    /// Consumes the server event stream until it ends.
    pub async fn run_events<S>(&self, events: S)
    where
        S: Stream<Item = DirectoryEvent> + Unpin,
    {
        self.dispatcher.run(events).await
    }

    pub fn registry(&self) -> &DirectoryRegistry {
        &self.registry
    }

    pub fn loader(&self) -> &SessionWindowLoader {
        &self.loader
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn coordinator(&self) -> &BootstrapCoordinator {
        &self.coordinator
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn actions(&self) -> &SessionActions {
        &self.actions
    }
}
