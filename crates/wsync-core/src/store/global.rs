use crate::model::Project;
use crate::sorted::{self, Upsert};

/// State shared by every directory: the project list.
#[derive(Debug, Clone, Default)]
pub struct GlobalStore {
    /// Projects, sorted by id
    pub projects: Vec<Project>,
    /// True once the first global bootstrap finished
    pub ready: bool,
}

impl GlobalStore {
    pub fn upsert_project(&mut self, project: Project) -> Upsert {
        sorted::upsert(&mut self.projects, project)
    }

    /// Replaces the project list wholesale, keeping id order.
    pub fn replace_projects(&mut self, projects: Vec<Project>) {
        self.projects.clear();
        for project in projects {
            sorted::upsert(&mut self.projects, project);
        }
    }

    pub fn project_for(&self, worktree: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.worktree == worktree)
    }
}
