use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::{StorageError, StorageResult};
use crate::storage::backend::{StorageBackend, StorageScope};

type Entries = HashMap<(StorageScope, String), Vec<u8>>;

/// In-memory backend (no persistence). Behaves like a real backend: it is
/// reference counted by the broker and refuses I/O once closed.
pub struct InMemoryBackend {
    working_folder: PathBuf,
    // None once closed
    map: Mutex<Option<Entries>>,
}

impl InMemoryBackend {
    pub fn new(working_folder: impl AsRef<Path>) -> Self {
        Self {
            working_folder: working_folder.as_ref().to_path_buf(),
            map: Mutex::new(Some(HashMap::new())),
        }
    }

    pub fn working_folder(&self) -> &Path {
        &self.working_folder
    }

    fn entries(&self) -> MutexGuard<'_, Option<Entries>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for InMemoryBackend {
    fn read(&self, scope: &StorageScope, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let guard = self.entries();
        let map = guard.as_ref().ok_or(StorageError::Closed)?;
        Ok(map.get(&(scope.clone(), name.to_string())).cloned())
    }

    fn write(&self, scope: &StorageScope, name: &str, data: &[u8]) -> StorageResult<bool> {
        let mut guard = self.entries();
        let map = guard.as_mut().ok_or(StorageError::Closed)?;
        map.insert((scope.clone(), name.to_string()), data.to_vec());
        Ok(true)
    }

    fn remove(&self, scope: &StorageScope, name: &str) -> StorageResult<()> {
        let mut guard = self.entries();
        let map = guard.as_mut().ok_or(StorageError::Closed)?;
        map.remove(&(scope.clone(), name.to_string()));
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        let guard = self.entries();
        Ok(guard.as_ref().ok_or(StorageError::Closed)?.len())
    }

    fn close(&self) {
        self.entries().take();
    }

    fn is_closed(&self) -> bool {
        self.entries().is_none()
    }
}
