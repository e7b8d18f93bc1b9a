//! Routes server events into the stores.
//!
//! Directory events reach only a resident store; events for other
//! directories are dropped since the store will be bootstrapped fresh when
//! it is next opened. Side effects reported by the reducer are performed
//! here.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use wsync_core::reducer::{self, Effect};
use wsync_core::{DirectoryEvent, RemoteApi, StoreChange, SyncEvent};

use crate::bootstrap::BootstrapCoordinator;
use crate::registry::DirectoryRegistry;

struct DispatcherInner {
    registry: DirectoryRegistry,
    coordinator: BootstrapCoordinator,
    remote: Arc<dyn RemoteApi>,
}

#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl EventDispatcher {
    pub fn new(
        registry: DirectoryRegistry,
        coordinator: BootstrapCoordinator,
        remote: Arc<dyn RemoteApi>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                coordinator,
                remote,
            }),
        }
    }

    /// Applies one event and performs its side effect.
    pub async fn dispatch(&self, event: DirectoryEvent) {
        if event.is_global()
            || matches!(
                event.payload,
                SyncEvent::ProjectUpdated(_) | SyncEvent::GlobalDisposed
            )
        {
            self.dispatch_global(&event.payload).await;
            return;
        }

        let Some(handle) = self.inner.registry.get(&event.directory) else {
            tracing::trace!(
                "[Dispatcher] Dropping {} for non-resident {}",
                event.payload.kind(),
                event.directory
            );
            return;
        };
        match handle.apply(&event.payload) {
            Ok(Some(effect)) => self.perform(&event.directory, effect).await,
            Ok(None) => {}
            Err(e) => tracing::debug!("[Dispatcher] {} skipped: {}", event.payload.kind(), e),
        }
    }

    /// Drains `events` in batches until the stream ends.
    ///
    /// Each batch is coalesced before it is applied, and the loop yields to
    /// the runtime every `event_yield_every` applied events.
    pub async fn run<S>(&self, events: S)
    where
        S: Stream<Item = DirectoryEvent> + Unpin,
    {
        let config = self.inner.registry.config();
        let yield_every = config.event_yield_every.max(1);
        let mut batches = events.ready_chunks(config.event_batch_size.max(1));
        let mut applied = 0usize;

        while let Some(batch) = batches.next().await {
            let received = batch.len();
            let batch = coalesce(batch);
            if batch.len() < received {
                tracing::trace!("[Dispatcher] Coalesced {} events into {}", received, batch.len());
            }
            for event in batch {
                self.dispatch(event).await;
                applied += 1;
                if applied % yield_every == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }
        tracing::info!("[Dispatcher] Event stream ended after {} events", applied);
    }

    async fn dispatch_global(&self, payload: &SyncEvent) {
        let (changed, effect) = self
            .inner
            .registry
            .update_global(|global| reducer::apply_global(global, payload));
        if changed {
            tracing::debug!("[Dispatcher] Project list updated");
        }
        if let Some(effect) = effect {
            self.perform(wsync_core::GLOBAL_DIRECTORY, effect).await;
        }
    }

    async fn perform(&self, directory: &str, effect: Effect) {
        match effect {
            Effect::RefreshDirectory(target) => self.inner.coordinator.push(&target).await,
            Effect::RefreshAll => self.inner.coordinator.refresh().await,
            Effect::RefetchLsp => self.refetch_lsp(directory).await,
            Effect::PersistDurable => {
                if let Err(e) = self.inner.registry.persist(directory).await {
                    tracing::warn!("[Dispatcher] Failed to persist side-cache for {}: {}", directory, e);
                }
            }
        }
    }

    async fn refetch_lsp(&self, directory: &str) {
        let lsp = match self.inner.remote.lsp_status(directory).await {
            Ok(lsp) => lsp,
            Err(e) => {
                tracing::warn!("[Dispatcher] Failed to refetch LSP status for {}: {}", directory, e);
                return;
            }
        };
        let Some(handle) = self.inner.registry.get(directory) else {
            return;
        };
        let _ = handle.mutate(|store| {
            if store.lsp == lsp {
                return Vec::new();
            }
            store.lsp = lsp;
            vec![StoreChange::Lsp]
        });
    }
}

/// Collapses one batch of events without changing its outcome.
///
/// - status, LSP and part-updated events keep only their last occurrence
///   per directory and key;
/// - adjacent unsequenced deltas to the same part field are concatenated.
pub fn coalesce(batch: Vec<DirectoryEvent>) -> Vec<DirectoryEvent> {
    let mut last: HashMap<(String, String), usize> = HashMap::new();
    for (index, event) in batch.iter().enumerate() {
        if let Some(key) = event.payload.coalesce_key() {
            last.insert((event.directory.clone(), key), index);
        }
    }

    let mut out: Vec<DirectoryEvent> = Vec::with_capacity(batch.len());
    for (index, event) in batch.into_iter().enumerate() {
        if let Some(key) = event.payload.coalesce_key()
            && last.get(&(event.directory.clone(), key)) != Some(&index)
        {
            continue;
        }
        if let Some(previous) = out.last_mut()
            && merge_delta(previous, &event)
        {
            continue;
        }
        out.push(event);
    }
    out
}

fn merge_delta(previous: &mut DirectoryEvent, next: &DirectoryEvent) -> bool {
    if previous.directory != next.directory {
        return false;
    }
    match (&mut previous.payload, &next.payload) {
        (
            SyncEvent::MessagePartDelta {
                part_id,
                field,
                delta,
                seq: None,
                ..
            },
            SyncEvent::MessagePartDelta {
                part_id: next_part,
                field: next_field,
                delta: next_delta,
                seq: None,
                ..
            },
        ) if *part_id == *next_part && *field == *next_field => {
            delta.push_str(next_delta);
            true
        }
        _ => false,
    }
}
