use std::path::PathBuf;

use crate::solution::SolutionId;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage at {0} is locked by another process")]
    LockedByOtherProcess(PathBuf),

    #[error("Storage at {path} is corrupt or unreadable: {reason}")]
    CorruptOrUnreadableStore { path: PathBuf, reason: String },

    #[error("Lifecycle misuse: {0}")]
    LifecycleMisuse(LifecycleMisuse),

    #[error("Cannot resolve storage location: {0}")]
    ResolutionFailure(String),

    #[error("Storage backend is closed")]
    Closed,

    #[cfg(feature = "sqlite_store")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] r2d2_sqlite::rusqlite::Error),

    #[cfg(feature = "sqlite_store")]
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the failure came from another process holding the store.
    /// Such stores must be left on disk.
    pub fn is_locked(&self) -> bool {
        matches!(self, StorageError::LockedByOtherProcess(_))
    }
}

/// Contract violations of the primary-solution registration protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleMisuse {
    #[error("primary solution {current} is still bound while registering {requested}")]
    PrimaryAlreadyBound {
        current: SolutionId,
        requested: SolutionId,
    },

    #[error("primary solution {current} is still registered while registering {requested}")]
    PrimaryAlreadyRegistered {
        current: SolutionId,
        requested: SolutionId,
    },

    #[error("unregistering {requested} but {registered} is the registered primary solution")]
    PrimaryMismatch {
        registered: SolutionId,
        requested: SolutionId,
    },
}

impl From<LifecycleMisuse> for StorageError {
    fn from(misuse: LifecycleMisuse) -> Self {
        StorageError::LifecycleMisuse(misuse)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
