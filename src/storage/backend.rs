use std::fmt::Display;

use crate::errors::StorageResult;

/// Part of a solution a stored entry belongs to.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum StorageScope {
    Solution,
    Project(String),
    Document(String),
}

impl Default for StorageScope {
    fn default() -> Self {
        StorageScope::Solution
    }
}

impl StorageScope {
    /// Stable textual key used by persistent backends.
    pub fn key(&self) -> String {
        match self {
            StorageScope::Solution => "solution".to_string(),
            StorageScope::Project(id) => format!("project:{id}"),
            StorageScope::Document(id) => format!("document:{id}"),
        }
    }
}

impl Display for StorageScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Object-safe key/value store bound to one working folder.
///
/// Implementations must be internally synchronized; all methods take `&self`
/// and may be called concurrently by every holder of the same handle.
///
/// Once [`close`](StorageBackend::close) has been called, every data method
/// must fail with [`StorageError::Closed`](crate::errors::StorageError::Closed)
/// without touching released resources.
pub trait StorageBackend: Send + Sync {
    /// Reads the value stored under `name` in `scope`, `None` on a miss.
    fn read(&self, scope: &StorageScope, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `data` under `name` in `scope`, overwriting any previous value.
    ///
    /// Returns `true` if the data was persisted, `false` if it was discarded.
    fn write(&self, scope: &StorageScope, name: &str, data: &[u8]) -> StorageResult<bool>;

    /// Removes the value stored under `name` in `scope`.
    fn remove(&self, scope: &StorageScope, name: &str) -> StorageResult<()>;

    /// Number of entries across all scopes.
    fn len(&self) -> StorageResult<usize>;

    /// Releases the underlying resources. Irreversible and idempotent.
    fn close(&self);

    /// Whether [`close`](StorageBackend::close) has been called.
    fn is_closed(&self) -> bool;

    /// Whether a value exists under `name` in `scope`.
    fn contains(&self, scope: &StorageScope, name: &str) -> StorageResult<bool> {
        Ok(self.read(scope, name)?.is_some())
    }

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}
