//! Session mutations initiated by the user.
//!
//! Each action calls the remote API, then reduces the returned session into
//! the resident store so the UI updates without waiting for the server's
//! event. The later event is a no-op by idempotency.

use std::sync::Arc;

use wsync_core::model::{Message, Part, Session};
use wsync_core::remote::{NewSession, SessionPatch};
use wsync_core::{RemoteApi, Result, SyncEvent, now_ms};

use crate::notifier::Notifier;
use crate::registry::DirectoryRegistry;

struct ActionsInner {
    registry: DirectoryRegistry,
    remote: Arc<dyn RemoteApi>,
    notifier: Notifier,
}

#[derive(Clone)]
pub struct SessionActions {
    inner: Arc<ActionsInner>,
}

impl SessionActions {
    pub fn new(registry: DirectoryRegistry, remote: Arc<dyn RemoteApi>, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(ActionsInner {
                registry,
                remote,
                notifier,
            }),
        }
    }

    pub async fn create(&self, directory: &str, request: NewSession) -> Result<Session> {
        let session = self
            .reported(directory, "Failed to create session", async {
                self.inner.remote.create_session(directory, request).await
            })
            .await?;
        self.commit(directory, SyncEvent::SessionCreated {
            info: session.clone(),
        });
        Ok(session)
    }

    /// Archives a session, removing it and its per-session caches.
    ///
    /// # Returns
    ///
    /// * `Err(WsyncError::NotFound)` - The session does not exist server-side
    pub async fn archive(&self, directory: &str, session_id: &str) -> Result<Session> {
        let patch = SessionPatch {
            archived: Some(now_ms()),
            ..SessionPatch::default()
        };
        self.patch(directory, session_id, patch, "Failed to archive session")
            .await
    }

    pub async fn set_title(&self, directory: &str, session_id: &str, title: &str) -> Result<Session> {
        let patch = SessionPatch {
            title: Some(title.to_string()),
            ..SessionPatch::default()
        };
        self.patch(directory, session_id, patch, "Failed to rename session")
            .await
    }

    pub async fn share(&self, directory: &str, session_id: &str) -> Result<Session> {
        let session = self
            .reported(directory, "Failed to share session", async {
                self.inner.remote.share_session(directory, session_id).await
            })
            .await?;
        self.commit(directory, SyncEvent::SessionUpdated {
            info: session.clone(),
        });
        Ok(session)
    }

    /// Shows a message before the server confirms it.
    pub fn optimistic_add(
        &self,
        directory: &str,
        session_id: &str,
        message: Message,
        parts: Vec<Part>,
    ) -> Result<()> {
        match self.inner.registry.get(directory) {
            Some(handle) => handle.optimistic_add(session_id, message, parts),
            None => Ok(()),
        }
    }

    /// Rolls back a message shown by [`Self::optimistic_add`].
    pub fn optimistic_remove(&self, directory: &str, session_id: &str, message_id: &str) -> Result<()> {
        match self.inner.registry.get(directory) {
            Some(handle) => handle.optimistic_remove(session_id, message_id),
            None => Ok(()),
        }
    }

    async fn patch(
        &self,
        directory: &str,
        session_id: &str,
        patch: SessionPatch,
        failure: &str,
    ) -> Result<Session> {
        let session = self
            .reported(directory, failure, async {
                self.inner
                    .remote
                    .update_session(directory, session_id, patch)
                    .await
            })
            .await?;
        self.commit(directory, SyncEvent::SessionUpdated {
            info: session.clone(),
        });
        Ok(session)
    }

    async fn reported<T>(
        &self,
        directory: &str,
        failure: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        call.await.inspect_err(|e| self.inner.notifier.error(directory, failure, e))
    }

    fn commit(&self, directory: &str, event: SyncEvent) {
        let Some(handle) = self.inner.registry.get(directory) else {
            return;
        };
        if let Err(e) = handle.apply(&event) {
            tracing::debug!("[SessionActions] {} not applied: {}", event.kind(), e);
        }
    }
}
