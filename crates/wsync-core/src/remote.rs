//! Remote data API consumed by the sync engine.
//!
//! Defines the interface the loaders and coordinators fetch through. The
//! transport and wire format are left to implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::model::{
    FileDiff, LspStatus, MessageWithParts, PermissionRequest, Project, ProviderSnapshot,
    QuestionRequest, Session, SessionStatus, Todo, VcsInfo,
};

/// Parameters of a root-session listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuery {
    /// Only sessions without a parent
    pub roots: bool,
    /// Most-recently-updated N; `None` lists everything
    pub limit: Option<usize>,
}

/// A session listing, with the exact root total when the server knows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionListing {
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub total: Option<usize>,
}

/// Fields of a session the client may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Archive timestamp in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// An abstract client for the assistant server.
///
/// Every directory-scoped call takes the workspace directory it targets.
/// Single-entity calls return `WsyncError::NotFound` when the entity no
/// longer exists server-side.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// The project backing `directory`.
    async fn current_project(&self, directory: &str) -> Result<Project>;

    async fn providers(&self, directory: &str) -> Result<ProviderSnapshot>;

    /// Effective configuration for `directory`, as an opaque document.
    async fn config(&self, directory: &str) -> Result<serde_json::Value>;

    async fn session_statuses(&self, directory: &str) -> Result<HashMap<String, SessionStatus>>;

    async fn vcs(&self, directory: &str) -> Result<Option<VcsInfo>>;

    async fn pending_permissions(&self, directory: &str) -> Result<Vec<PermissionRequest>>;

    async fn pending_questions(&self, directory: &str) -> Result<Vec<QuestionRequest>>;

    async fn lsp_status(&self, directory: &str) -> Result<Vec<LspStatus>>;

    async fn list_sessions(&self, directory: &str, query: SessionQuery) -> Result<SessionListing>;

    async fn get_session(&self, directory: &str, session_id: &str) -> Result<Session>;

    async fn create_session(&self, directory: &str, request: NewSession) -> Result<Session>;

    async fn update_session(
        &self,
        directory: &str,
        session_id: &str,
        patch: SessionPatch,
    ) -> Result<Session>;

    async fn share_session(&self, directory: &str, session_id: &str) -> Result<Session>;

    /// The `limit` most recent messages of a session, oldest first.
    async fn messages(
        &self,
        directory: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageWithParts>>;

    async fn session_diff(&self, directory: &str, session_id: &str) -> Result<Vec<FileDiff>>;

    async fn session_todo(&self, directory: &str, session_id: &str) -> Result<Vec<Todo>>;

    /// Every project known to the server.
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Replaces the global configuration; the server reloads every instance.
    async fn update_global_config(&self, config: serde_json::Value) -> Result<()>;
}
