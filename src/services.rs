//! External collaborators consumed by the broker.
//!
//! The broker does not know where a solution's files should live or how big
//! a solution is. Both answers come from the host through the traits below.
//! Reference implementations are provided for hosts without their own.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use crate::solution::{SolutionId, SolutionSnapshot};

/// Decides where a solution's storage files live.
///
/// Returning `None` means the solution cannot be persisted (e.g. it is not
/// file-backed); the broker then hands out no-op storage.
pub trait WorkingFolderResolver: Send + Sync {
    fn working_folder(&self, solution: &SolutionSnapshot) -> Option<PathBuf>;
}

impl<F> WorkingFolderResolver for F
where
    F: Fn(&SolutionSnapshot) -> Option<PathBuf> + Send + Sync,
{
    fn working_folder(&self, solution: &SolutionSnapshot) -> Option<PathBuf> {
        self(solution)
    }
}

/// Approximate on-disk size oracle, used only as a heuristic threshold.
pub trait SizeTracker: Send + Sync {
    /// Size of the solution in bytes, `None` when unknown.
    fn solution_size(&self, id: SolutionId) -> Option<u64>;
}

/// Places storage in a hidden folder next to the solution file:
/// `<solution dir>/<folder_name>/<solution file stem>`.
#[derive(Debug, Clone)]
pub struct HiddenFolderResolver {
    folder_name: String,
}

impl Default for HiddenFolderResolver {
    fn default() -> Self {
        Self::new(".storage")
    }
}

impl HiddenFolderResolver {
    pub fn new(folder_name: impl Into<String>) -> Self {
        Self {
            folder_name: folder_name.into(),
        }
    }
}

impl WorkingFolderResolver for HiddenFolderResolver {
    fn working_folder(&self, solution: &SolutionSnapshot) -> Option<PathBuf> {
        let path = solution.file_path()?;
        let parent = path.parent()?;
        let stem = path.file_stem()?;
        Some(parent.join(&self.folder_name).join(stem))
    }
}

/// Reports the same size for every solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSizeTracker(pub u64);

impl SizeTracker for FixedSizeTracker {
    fn solution_size(&self, _id: SolutionId) -> Option<u64> {
        Some(self.0)
    }
}

/// Size tracker fed by the host as solutions load and grow.
#[derive(Debug, Default)]
pub struct InMemorySizeTracker {
    sizes: RwLock<HashMap<SolutionId, u64>>,
}

impl InMemorySizeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: SolutionId, bytes: u64) {
        self.sizes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, bytes);
    }

    pub fn remove(&self, id: SolutionId) {
        self.sizes.write().unwrap_or_else(PoisonError::into_inner).remove(&id);
    }
}

impl SizeTracker for InMemorySizeTracker {
    fn solution_size(&self, id: SolutionId) -> Option<u64> {
        self.sizes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn hidden_folder_sits_next_to_solution() {
        let snapshot = SolutionSnapshot::primary(SolutionId::new(), Some("/src/app/App.sln".into()));
        let folder = HiddenFolderResolver::default().working_folder(&snapshot).unwrap();
        assert_eq!(folder, Path::new("/src/app/.storage/App"));
    }

    #[test]
    fn hidden_folder_needs_a_file_path() {
        let snapshot = SolutionSnapshot::primary(SolutionId::new(), None);
        assert!(HiddenFolderResolver::default().working_folder(&snapshot).is_none());

        let snapshot = SolutionSnapshot::primary(SolutionId::new(), Some("/".into()));
        assert!(HiddenFolderResolver::default().working_folder(&snapshot).is_none());
    }

    #[test]
    fn closures_resolve_working_folders() {
        let resolver = |_: &SolutionSnapshot| Some(PathBuf::from("/cache"));
        let snapshot = SolutionSnapshot::primary(SolutionId::new(), None);
        assert_eq!(resolver.working_folder(&snapshot), Some(PathBuf::from("/cache")));
    }

    #[test]
    fn in_memory_tracker_tracks_growth() {
        let tracker = InMemorySizeTracker::new();
        let id = SolutionId::new();
        assert_eq!(tracker.solution_size(id), None);

        tracker.set(id, 10);
        tracker.set(id, 60);
        assert_eq!(tracker.solution_size(id), Some(60));

        tracker.remove(id);
        assert_eq!(tracker.solution_size(id), None);
        assert_eq!(FixedSizeTracker(7).solution_size(id), Some(7));
    }
}
