//! Typed domain events delivered by the multiplexed event stream.

use serde::{Deserialize, Serialize};

use crate::model::{
    FileDiff, Message, Part, PermissionRequest, Project, QuestionRequest, Session, SessionStatus,
    Todo,
};

/// Directory key used for events that are not scoped to one workspace.
pub const GLOBAL_DIRECTORY: &str = "global";

/// A domain event. The serialized form is `{"type": ..., "properties": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties")]
pub enum SyncEvent {
    #[serde(rename = "session.created")]
    SessionCreated { info: Session },
    #[serde(rename = "session.updated")]
    SessionUpdated { info: Session },
    #[serde(rename = "session.deleted")]
    SessionDeleted { info: Session },
    #[serde(rename = "session.diff", rename_all = "camelCase")]
    SessionDiff {
        session_id: String,
        diff: Vec<FileDiff>,
    },
    #[serde(rename = "session.status", rename_all = "camelCase")]
    SessionStatusUpdated {
        session_id: String,
        status: SessionStatus,
    },
    #[serde(rename = "todo.updated", rename_all = "camelCase")]
    TodoUpdated { session_id: String, todos: Vec<Todo> },
    #[serde(rename = "message.updated")]
    MessageUpdated { info: Message },
    #[serde(rename = "message.removed", rename_all = "camelCase")]
    MessageRemoved {
        session_id: String,
        message_id: String,
    },
    #[serde(rename = "message.part.updated")]
    MessagePartUpdated { part: Part },
    #[serde(rename = "message.part.removed", rename_all = "camelCase")]
    MessagePartRemoved {
        session_id: String,
        message_id: String,
        part_id: String,
    },
    /// Appends `delta` to `field` of an existing part. `seq`, when present,
    /// is monotonic per `(part_id, field)` and makes the append idempotent.
    #[serde(rename = "message.part.delta", rename_all = "camelCase")]
    MessagePartDelta {
        session_id: String,
        message_id: String,
        part_id: String,
        field: String,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    #[serde(rename = "permission.asked")]
    PermissionAsked(PermissionRequest),
    #[serde(rename = "permission.replied", rename_all = "camelCase")]
    PermissionReplied {
        session_id: String,
        request_id: String,
    },
    #[serde(rename = "question.asked")]
    QuestionAsked(QuestionRequest),
    #[serde(rename = "question.replied", rename_all = "camelCase")]
    QuestionReplied {
        session_id: String,
        request_id: String,
    },
    #[serde(rename = "question.rejected", rename_all = "camelCase")]
    QuestionRejected {
        session_id: String,
        request_id: String,
    },
    #[serde(rename = "vcs.branch.updated")]
    VcsBranchUpdated { branch: Option<String> },
    #[serde(rename = "lsp.updated")]
    LspUpdated,
    #[serde(rename = "server.instance.disposed")]
    ServerInstanceDisposed { directory: String },
    #[serde(rename = "project.updated")]
    ProjectUpdated(Project),
    #[serde(rename = "global.disposed")]
    GlobalDisposed,
}

impl SyncEvent {
    /// The wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session.created",
            Self::SessionUpdated { .. } => "session.updated",
            Self::SessionDeleted { .. } => "session.deleted",
            Self::SessionDiff { .. } => "session.diff",
            Self::SessionStatusUpdated { .. } => "session.status",
            Self::TodoUpdated { .. } => "todo.updated",
            Self::MessageUpdated { .. } => "message.updated",
            Self::MessageRemoved { .. } => "message.removed",
            Self::MessagePartUpdated { .. } => "message.part.updated",
            Self::MessagePartRemoved { .. } => "message.part.removed",
            Self::MessagePartDelta { .. } => "message.part.delta",
            Self::PermissionAsked(_) => "permission.asked",
            Self::PermissionReplied { .. } => "permission.replied",
            Self::QuestionAsked(_) => "question.asked",
            Self::QuestionReplied { .. } => "question.replied",
            Self::QuestionRejected { .. } => "question.rejected",
            Self::VcsBranchUpdated { .. } => "vcs.branch.updated",
            Self::LspUpdated => "lsp.updated",
            Self::ServerInstanceDisposed { .. } => "server.instance.disposed",
            Self::ProjectUpdated(_) => "project.updated",
            Self::GlobalDisposed => "global.disposed",
        }
    }

    /// Key under which consecutive events collapse to the last value.
    ///
    /// Only high-frequency kinds whose latest value fully describes the
    /// state carry a key.
    pub fn coalesce_key(&self) -> Option<String> {
        match self {
            Self::SessionStatusUpdated { session_id, .. } => {
                Some(format!("session.status:{session_id}"))
            }
            Self::LspUpdated => Some("lsp.updated".to_string()),
            Self::MessagePartUpdated { part } => Some(format!("message.part.updated:{}", part.id)),
            _ => None,
        }
    }
}

/// An event tagged with the directory it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEvent {
    pub directory: String,
    pub payload: SyncEvent,
}

impl DirectoryEvent {
    pub fn new(directory: impl Into<String>, payload: SyncEvent) -> Self {
        Self {
            directory: directory.into(),
            payload,
        }
    }

    pub fn global(payload: SyncEvent) -> Self {
        Self::new(GLOBAL_DIRECTORY, payload)
    }

    pub fn is_global(&self) -> bool {
        self.directory == GLOBAL_DIRECTORY
    }
}
