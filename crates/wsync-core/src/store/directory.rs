//! The per-directory data container.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{
    DirectoryCache, FileDiff, LspStatus, Message, Part, PermissionRequest, ProjectMeta,
    ProviderSnapshot, QuestionRequest, Session, SessionStatus, Todo, VcsInfo,
};
use crate::sorted;

/// Load state of a directory store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    #[default]
    Loading,
    Complete,
}

/// The sub-path of a store touched by a mutation.
///
/// Observers subscribe to these instead of diffing whole stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreChange {
    Sessions,
    SessionTotal,
    Messages { session_id: String },
    Parts { message_id: String },
    Diff { session_id: String },
    Todo { session_id: String },
    Status { session_id: String },
    Permission { session_id: String },
    Question { session_id: String },
    Vcs,
    Lsp,
    ProjectMeta,
    Icon,
    Limit,
    Bootstrap,
}

/// Message-window bookkeeping for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageWindow {
    /// Number of most-recent messages requested so far
    pub limit: usize,
    /// True once the server returned fewer messages than requested
    pub complete: bool,
}

/// One reactive record per workspace directory.
///
/// All per-entity collections (`sessions`, every `messages[session]`, every
/// `parts[message]`) are sorted ascending by id.
#[derive(Debug, Clone, Default)]
pub struct DirectoryStore {
    pub directory: String,
    pub project: Option<String>,
    pub providers: ProviderSnapshot,
    pub config: serde_json::Value,
    pub sessions: Vec<Session>,
    /// Root-session count; an estimate when the server truncated its listing
    pub session_total: usize,
    pub messages: HashMap<String, Vec<Message>>,
    pub parts: HashMap<String, Vec<Part>>,
    pub session_diff: HashMap<String, Vec<FileDiff>>,
    pub todo: HashMap<String, Vec<Todo>>,
    pub session_status: HashMap<String, SessionStatus>,
    pub permission: HashMap<String, Vec<PermissionRequest>>,
    pub question: HashMap<String, Vec<QuestionRequest>>,
    pub lsp: Vec<LspStatus>,
    /// Session window size
    pub limit: usize,
    /// Window size the current session list was fetched with
    pub loaded_limit: Option<usize>,
    pub status: StoreStatus,
    pub vcs: Option<VcsInfo>,
    pub project_meta: Option<ProjectMeta>,
    pub icon: Option<String>,
    pub message_window: HashMap<String, MessageWindow>,
    /// Last applied delta sequence per `(part_id, field)`
    pub(crate) delta_seq: HashMap<(String, String), u64>,
}

impl DirectoryStore {
    /// Creates an empty store in `Loading` state, seeded from the durable record.
    pub fn new(directory: impl Into<String>, limit: usize, cache: DirectoryCache) -> Self {
        Self {
            directory: directory.into(),
            limit,
            vcs: cache.vcs,
            project_meta: cache.meta,
            icon: cache.icon,
            config: serde_json::Value::Null,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == StoreStatus::Complete
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        sorted::find(&self.sessions, session_id)
    }

    pub fn messages_of(&self, session_id: &str) -> &[Message] {
        self.messages.get(session_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parts_of(&self, message_id: &str) -> &[Part] {
        self.parts.get(message_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn part(&self, message_id: &str, part_id: &str) -> Option<&Part> {
        sorted::find(self.parts_of(message_id), part_id)
    }

    /// Number of root sessions currently materialized.
    pub fn root_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_root()).count()
    }

    /// The durable fields mirrored to the side-cache.
    pub fn durable_record(&self) -> DirectoryCache {
        DirectoryCache {
            vcs: self.vcs.clone(),
            meta: self.project_meta.clone(),
            icon: self.icon.clone(),
        }
    }

    /// Drops every part of `message_id`, with its delta bookkeeping.
    pub(crate) fn drop_parts(&mut self, message_id: &str) -> bool {
        match self.parts.remove(message_id) {
            Some(parts) => {
                for part in &parts {
                    self.forget_deltas(&part.id);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn forget_deltas(&mut self, part_id: &str) {
        self.delta_seq.retain(|(id, _), _| id != part_id);
    }

    /// Removes every per-session cache of `session_id`: messages, the parts
    /// of those messages, diff, todo, status, permission and question
    /// requests, and message-window bookkeeping.
    pub fn purge_session(&mut self, session_id: &str) -> Vec<StoreChange> {
        let mut changes = Vec::new();
        let sid = || session_id.to_string();

        if let Some(messages) = self.messages.remove(session_id) {
            for message in &messages {
                if self.drop_parts(&message.id) {
                    changes.push(StoreChange::Parts {
                        message_id: message.id.clone(),
                    });
                }
            }
            changes.push(StoreChange::Messages { session_id: sid() });
        }
        if self.session_diff.remove(session_id).is_some() {
            changes.push(StoreChange::Diff { session_id: sid() });
        }
        if self.todo.remove(session_id).is_some() {
            changes.push(StoreChange::Todo { session_id: sid() });
        }
        if self.session_status.remove(session_id).is_some() {
            changes.push(StoreChange::Status { session_id: sid() });
        }
        if self.permission.remove(session_id).is_some() {
            changes.push(StoreChange::Permission { session_id: sid() });
        }
        if self.question.remove(session_id).is_some() {
            changes.push(StoreChange::Question { session_id: sid() });
        }
        self.message_window.remove(session_id);
        changes
    }
}
