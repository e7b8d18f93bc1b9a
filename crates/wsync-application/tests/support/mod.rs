//! Shared fakes for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use wsync_application::{Notifier, SyncNotice, WorkspaceSync};
use wsync_core::model::{
    DirectoryCache, FileDiff, LspStatus, Message, MessageRole, MessageTime, MessageWithParts, Part,
    PartKind, PermissionRequest, Project, ProjectTime, ProviderSnapshot, QuestionRequest, Session,
    SessionStatus, SessionTime, Todo, VcsInfo,
};
use wsync_core::remote::{NewSession, SessionListing, SessionPatch, SessionQuery};
use wsync_core::{RemoteApi, Result, SideCacheRepository, SyncConfig, WsyncError};

/// In-memory remote server that counts calls per method and directory.
#[derive(Default)]
pub struct FakeRemote {
    sessions: Mutex<HashMap<String, Vec<Session>>>,
    history: Mutex<HashMap<String, Vec<MessageWithParts>>>,
    lsp: Mutex<Vec<LspStatus>>,
    branch: Mutex<Option<String>>,
    calls: Mutex<HashMap<String, usize>>,
    /// Bounded root listings fail, forcing the unbounded fallback
    pub fail_bounded_listing: AtomicBool,
    /// `current_project` fails
    pub fail_project: AtomicBool,
    project_gate: Mutex<Option<Arc<Notify>>>,
    config_gate: Mutex<Option<Arc<Notify>>>,
    next_id: Mutex<usize>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_session(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap()
            .entry(session.directory.clone())
            .or_default()
            .push(session);
    }

    pub fn add_message(&self, entry: MessageWithParts) {
        self.history
            .lock()
            .unwrap()
            .entry(entry.info.session_id.clone())
            .or_default()
            .push(entry);
    }

    pub fn set_lsp(&self, lsp: Vec<LspStatus>) {
        *self.lsp.lock().unwrap() = lsp;
    }

    pub fn set_branch(&self, branch: &str) {
        *self.branch.lock().unwrap() = Some(branch.to_string());
    }

    /// Total calls of `method` across directories.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Calls of `method` for one directory.
    pub fn calls_for(&self, method: &str, directory: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&format!("{method}:{directory}"))
            .copied()
            .unwrap_or(0)
    }

    /// Holds `current_project` until [`Self::release_project`].
    pub fn hold_project(&self) {
        *self.project_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn release_project(&self) {
        if let Some(gate) = self.project_gate.lock().unwrap().take() {
            gate.notify_one();
        }
    }

    /// Holds `update_global_config` until [`Self::release_config`].
    pub fn hold_config(&self) {
        *self.config_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn release_config(&self) {
        if let Some(gate) = self.config_gate.lock().unwrap().take() {
            gate.notify_one();
        }
    }

    async fn record(&self, method: &str, directory: &str) {
        {
            let mut calls = self.calls.lock().unwrap();
            *calls.entry(method.to_string()).or_default() += 1;
            *calls.entry(format!("{method}:{directory}")).or_default() += 1;
        }
        // Give concurrent callers a chance to join the same load.
        tokio::task::yield_now().await;
    }

    fn find_session(&self, directory: &str, session_id: &str) -> Result<Session> {
        self.sessions
            .lock()
            .unwrap()
            .get(directory)
            .and_then(|list| list.iter().find(|s| s.id == session_id).cloned())
            .ok_or_else(|| WsyncError::not_found("Session", session_id))
    }

    fn replace_session(&self, session: Session) {
        let mut sessions = self.sessions.lock().unwrap();
        let list = sessions.entry(session.directory.clone()).or_default();
        list.retain(|s| s.id != session.id);
        list.push(session);
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn current_project(&self, directory: &str) -> Result<Project> {
        self.record("current_project", directory).await;
        let gate = self.project_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_project.load(Ordering::SeqCst) {
            return Err(WsyncError::remote("project unavailable"));
        }
        Ok(project(directory))
    }

    async fn providers(&self, directory: &str) -> Result<ProviderSnapshot> {
        self.record("providers", directory).await;
        Ok(ProviderSnapshot::default())
    }

    async fn config(&self, directory: &str) -> Result<serde_json::Value> {
        self.record("config", directory).await;
        Ok(serde_json::json!({ "theme": "dark" }))
    }

    async fn session_statuses(&self, directory: &str) -> Result<HashMap<String, SessionStatus>> {
        self.record("session_statuses", directory).await;
        Ok(HashMap::new())
    }

    async fn vcs(&self, directory: &str) -> Result<Option<VcsInfo>> {
        self.record("vcs", directory).await;
        let branch = self.branch.lock().unwrap().clone();
        Ok(branch.map(|branch| VcsInfo {
            branch: Some(branch),
        }))
    }

    async fn pending_permissions(&self, directory: &str) -> Result<Vec<PermissionRequest>> {
        self.record("pending_permissions", directory).await;
        Ok(Vec::new())
    }

    async fn pending_questions(&self, directory: &str) -> Result<Vec<QuestionRequest>> {
        self.record("pending_questions", directory).await;
        Ok(Vec::new())
    }

    async fn lsp_status(&self, directory: &str) -> Result<Vec<LspStatus>> {
        self.record("lsp_status", directory).await;
        Ok(self.lsp.lock().unwrap().clone())
    }

    async fn list_sessions(&self, directory: &str, query: SessionQuery) -> Result<SessionListing> {
        self.record("list_sessions", directory).await;
        if query.limit.is_some() && self.fail_bounded_listing.load(Ordering::SeqCst) {
            return Err(WsyncError::remote("limit not supported"));
        }
        let mut sessions: Vec<Session> = self
            .sessions
            .lock()
            .unwrap()
            .get(directory)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|s| !query.roots || s.is_root())
            .collect();
        sessions.sort_by(|a, b| b.time.updated.cmp(&a.time.updated));
        if let Some(limit) = query.limit {
            sessions.truncate(limit);
        }
        Ok(SessionListing {
            sessions,
            total: None,
        })
    }

    async fn get_session(&self, directory: &str, session_id: &str) -> Result<Session> {
        self.record("get_session", directory).await;
        self.find_session(directory, session_id)
    }

    async fn create_session(&self, directory: &str, request: NewSession) -> Result<Session> {
        self.record("create_session", directory).await;
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("ses_new{:03}", *next)
        };
        let mut created = session(directory, &id, request.parent_id.as_deref(), 9_000);
        created.title = request.title.unwrap_or_default();
        self.replace_session(created.clone());
        Ok(created)
    }

    async fn update_session(
        &self,
        directory: &str,
        session_id: &str,
        patch: SessionPatch,
    ) -> Result<Session> {
        self.record("update_session", directory).await;
        let mut session = self.find_session(directory, session_id)?;
        if let Some(title) = patch.title {
            session.title = title;
        }
        if let Some(archived) = patch.archived {
            session.time.archived = Some(archived);
        }
        self.replace_session(session.clone());
        Ok(session)
    }

    async fn share_session(&self, directory: &str, session_id: &str) -> Result<Session> {
        self.record("share_session", directory).await;
        let mut session = self.find_session(directory, session_id)?;
        session.share = Some(wsync_core::model::ShareInfo {
            url: format!("https://share.example/{session_id}"),
        });
        self.replace_session(session.clone());
        Ok(session)
    }

    async fn messages(
        &self,
        directory: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageWithParts>> {
        self.record("messages", directory).await;
        let all = self
            .history
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn session_diff(&self, directory: &str, _session_id: &str) -> Result<Vec<FileDiff>> {
        self.record("session_diff", directory).await;
        Ok(Vec::new())
    }

    async fn session_todo(&self, directory: &str, _session_id: &str) -> Result<Vec<Todo>> {
        self.record("session_todo", directory).await;
        Ok(Vec::new())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.record("list_projects", "global").await;
        Ok(vec![project("/work/api"), project("/work/web")])
    }

    async fn update_global_config(&self, _config: serde_json::Value) -> Result<()> {
        self.record("update_global_config", "global").await;
        let gate = self.config_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySideCache {
    records: Mutex<HashMap<String, DirectoryCache>>,
}

impl MemorySideCache {
    pub fn get(&self, directory: &str) -> Option<DirectoryCache> {
        self.records.lock().unwrap().get(directory).cloned()
    }
}

#[async_trait]
impl SideCacheRepository for MemorySideCache {
    async fn load(&self, directory: &str) -> Result<Option<DirectoryCache>> {
        Ok(self.get(directory))
    }

    async fn save(&self, directory: &str, record: &DirectoryCache) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(directory.to_string(), record.clone());
        Ok(())
    }

    async fn remove(&self, directory: &str) -> Result<()> {
        self.records.lock().unwrap().remove(directory);
        Ok(())
    }
}

pub struct Harness {
    pub sync: WorkspaceSync,
    pub remote: Arc<FakeRemote>,
    pub cache: Arc<MemorySideCache>,
    pub notices: tokio::sync::mpsc::UnboundedReceiver<SyncNotice>,
}

impl Harness {
    pub fn new(config: SyncConfig) -> Self {
        let remote = FakeRemote::new();
        let cache = Arc::new(MemorySideCache::default());
        let (notifier, notices) = Notifier::channel();
        let sync = WorkspaceSync::new(config, remote.clone(), cache.clone(), notifier);
        Self {
            sync,
            remote,
            cache,
            notices,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SyncConfig::default())
    }
}

pub fn project(directory: &str) -> Project {
    Project {
        id: format!("prj{}", directory.replace('/', "_")),
        worktree: directory.to_string(),
        name: None,
        vcs: Some("git".to_string()),
        time: ProjectTime::default(),
    }
}

pub fn session(directory: &str, id: &str, parent: Option<&str>, updated: i64) -> Session {
    Session {
        id: id.to_string(),
        parent_id: parent.map(str::to_string),
        title: format!("title of {id}"),
        directory: directory.to_string(),
        time: SessionTime {
            created: updated,
            updated,
            archived: None,
        },
        permission: Vec::new(),
        share: None,
    }
}

pub fn message(session_id: &str, id: &str) -> Message {
    Message {
        id: id.to_string(),
        session_id: session_id.to_string(),
        role: MessageRole::User,
        time: MessageTime::default(),
        agent: None,
        model: None,
        error: None,
    }
}

pub fn text_part(session_id: &str, message_id: &str, id: &str, text: &str) -> Part {
    Part {
        id: id.to_string(),
        session_id: session_id.to_string(),
        message_id: message_id.to_string(),
        kind: PartKind::Text {
            text: text.to_string(),
            synthetic: false,
        },
    }
}

pub fn with_parts(info: Message, parts: Vec<Part>) -> MessageWithParts {
    MessageWithParts { info, parts }
}
