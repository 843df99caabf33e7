use crate::errors::StorageResult;
use crate::storage::backend::{StorageBackend, StorageScope};

/// Backend substitute used when persistence is not warranted or not available.
///
/// Performs no I/O: writes are accepted and discarded, reads always miss.
/// It is stateless, so closing it has no effect.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpStorage;

impl NoOpStorage {
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for NoOpStorage {
    fn read(&self, _scope: &StorageScope, _name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn write(&self, _scope: &StorageScope, _name: &str, _data: &[u8]) -> StorageResult<bool> {
        Ok(false)
    }

    fn remove(&self, _scope: &StorageScope, _name: &str) -> StorageResult<()> {
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(0)
    }

    fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_discarded() {
        let storage = NoOpStorage::new();
        let scope = StorageScope::Solution;

        assert!(!storage.write(&scope, "k", b"v").unwrap());
        assert!(storage.read(&scope, "k").unwrap().is_none());
        assert!(!storage.contains(&scope, "k").unwrap());
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn close_is_meaningless() {
        let storage = NoOpStorage::new();
        storage.close();
        assert!(!storage.is_closed());
        assert!(storage.write(&StorageScope::Solution, "k", b"v").is_ok());
    }
}
