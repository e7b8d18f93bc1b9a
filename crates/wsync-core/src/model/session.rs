//! Session domain model.

use serde::{Deserialize, Serialize};

/// A conversation session inside one workspace directory.
///
/// Session ids are lexicographically sortable and encode recency, so every
/// per-directory collection keeps sessions ordered by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique, sortable session identifier
    pub id: String,
    /// Parent session id; `None` for root sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Human-readable title
    #[serde(default)]
    pub title: String,
    /// Workspace directory the session belongs to
    #[serde(default)]
    pub directory: String,
    pub time: SessionTime,
    /// Permission rules attached to the session
    #[serde(default)]
    pub permission: Vec<PermissionRule>,
    /// Share link, once the session has been shared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ShareInfo>,
}

impl Session {
    /// Returns true when the session has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Returns true when the session carries an archive timestamp.
    pub fn is_archived(&self) -> bool {
        self.time.archived.is_some()
    }
}

/// Session timestamps in milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTime {
    pub created: i64,
    pub updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Allow,
    Deny,
    Ask,
}

/// A single permission rule (`permission` glob matched against `pattern`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub permission: String,
    pub pattern: String,
    pub action: PermissionAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareInfo {
    pub url: String,
}
