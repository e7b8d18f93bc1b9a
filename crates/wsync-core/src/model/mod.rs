//! Domain models shared by the store, the reducer and the remote API.
//!
//! # Module Structure
//!
//! - `session`: sessions and their timestamps/permission rules
//! - `message`: messages and type-tagged parts
//! - `request`: pending permission and question requests
//! - `activity`: diffs, todos and run status
//! - `project`: projects, provider snapshots and durable directory records

mod activity;
mod message;
mod project;
mod request;
mod session;

pub use activity::{FileDiff, SessionStatus, Todo, TodoStatus};
pub use message::{
    Message, MessageRole, MessageTime, MessageWithParts, ModelRef, Part, PartKind, ToolStatus,
};
pub use project::{
    DirectoryCache, LspStatus, Project, ProjectMeta, ProjectMetaPatch, ProjectTime, ProviderInfo,
    ProviderSnapshot, VcsInfo,
};
pub use request::{PermissionRequest, Question, QuestionOption, QuestionRequest};
pub use session::{PermissionAction, PermissionRule, Session, SessionTime, ShareInfo};
