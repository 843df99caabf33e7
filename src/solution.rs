//! Solution identities and the read-only snapshot handed to the broker.
//!
//! A [`SolutionSnapshot`] is owned by the workspace model. The broker only
//! reads it for the duration of a single [`get_storage`] call.
//!
//! [`get_storage`]: crate::StorageBroker::get_storage
use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a solution, represented as a UUID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SolutionId(Uuid);

impl SolutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SolutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SolutionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for SolutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a branch of a workspace. The workspace has exactly one primary
/// branch; every fork or speculative snapshot gets a fresh id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchId(Uuid);

impl BranchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BranchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only view of a solution as seen by the storage broker.
#[derive(Debug, Clone)]
pub struct SolutionSnapshot {
    /// Identity of the solution, stable across snapshots.
    pub id: SolutionId,
    /// Path of the solution file, absent for in-memory workspaces.
    pub path: Option<PathBuf>,
    /// Branch this snapshot belongs to.
    pub branch: BranchId,
    /// The primary branch of the owning workspace.
    pub primary_branch: BranchId,
    /// Whether the owning workspace allows persistent storage at all.
    pub supports_persistence: bool,
}

impl SolutionSnapshot {
    /// A snapshot on the primary branch of a workspace that supports persistence.
    pub fn primary(id: SolutionId, path: Option<PathBuf>) -> Self {
        let branch = BranchId::new();
        Self {
            id,
            path,
            branch,
            primary_branch: branch,
            supports_persistence: true,
        }
    }

    /// Returns a forked snapshot of the same solution on a new branch.
    pub fn fork(&self) -> Self {
        Self {
            branch: BranchId::new(),
            ..self.clone()
        }
    }

    pub fn is_primary_branch(&self) -> bool {
        self.branch == self.primary_branch
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_snapshot_is_on_primary_branch() {
        let snapshot = SolutionSnapshot::primary(SolutionId::new(), Some("/w/app.sln".into()));
        assert!(snapshot.is_primary_branch());
        assert_eq!(snapshot.file_path(), Some(Path::new("/w/app.sln")));
    }

    #[test]
    fn fork_keeps_identity_but_leaves_primary_branch() {
        let snapshot = SolutionSnapshot::primary(SolutionId::new(), None);
        let fork = snapshot.fork();

        assert_eq!(fork.id, snapshot.id);
        assert_eq!(fork.primary_branch, snapshot.primary_branch);
        assert!(!fork.is_primary_branch());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(SolutionId::new(), SolutionId::new());
        assert_ne!(BranchId::new(), BranchId::new());
    }
}
