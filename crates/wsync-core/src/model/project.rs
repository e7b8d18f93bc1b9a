//! Project, provider and durable directory records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A project known to the server (one per worktree).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub worktree: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<String>,
    #[serde(default)]
    pub time: ProjectTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTime {
    pub created: i64,
    #[serde(default)]
    pub updated: i64,
}

/// Version-control state of a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// User-editable project presentation metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
}

/// A partial update for [`ProjectMeta`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetaPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub start_command: Option<String>,
}

impl ProjectMeta {
    /// Merges `patch` into `self`, returning true when anything changed.
    pub fn merge(&mut self, patch: &ProjectMetaPatch) -> bool {
        let before = self.clone();
        if let Some(name) = &patch.name {
            self.name = Some(name.clone());
        }
        if let Some(color) = &patch.color {
            self.color = Some(color.clone());
        }
        if let Some(command) = &patch.start_command {
            self.start_command = Some(command.clone());
        }
        *self != before
    }
}

/// The small per-directory record that outlives store eviction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryCache {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ProjectMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub models: Vec<String>,
}

/// Providers visible from one directory, plus the connected subset and the
/// default model per provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    #[serde(default)]
    pub all: Vec<ProviderInfo>,
    #[serde(default)]
    pub connected: Vec<String>,
    #[serde(default)]
    pub default: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspStatus {
    pub id: String,
    pub name: String,
    pub root: String,
    pub connected: bool,
}
