//! Backend construction with bounded recovery.
//!
//! A [`BackendFactory`] knows how to open one kind of backend. [`try_create`]
//! wraps any factory in the recovery policy the broker relies on:
//!
//! ```text
//! FirstAttempt ──ok──────────────────────────────► Some(backend)
//!      │ locked ─────────────────────────────────► None (files untouched)
//!      │ other failure
//!      ▼
//!   Cleanup (delete working folder, best effort)
//!      ▼
//! SecondAttempt ──ok─────────────────────────────► Some(backend)
//!      │ failure
//!      ▼
//! PermanentFallback ─────────────────────────────► None
//! ```
//!
//! The factory is asked at most twice per call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{StorageError, StorageResult};
use crate::storage::{BackendHandle, InMemoryBackend};

/// Opens backends for a working folder.
///
/// On failure an implementation must release whatever it partially opened
/// before returning the error.
pub trait BackendFactory: Send + Sync {
    fn open(&self, working_folder: &Path, solution_path: &Path) -> StorageResult<BackendHandle>;
}

/// Mints [`InMemoryBackend`]s. Nothing is ever written to disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryBackendFactory;

impl BackendFactory for InMemoryBackendFactory {
    fn open(&self, working_folder: &Path, _solution_path: &Path) -> StorageResult<BackendHandle> {
        Ok(Arc::new(InMemoryBackend::new(working_folder)))
    }
}

#[cfg(feature = "sqlite_store")]
pub use sqlite::SqliteBackendFactory;

#[cfg(feature = "sqlite_store")]
mod sqlite {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::storage::sqlite_store::{SqliteBackend, SqliteOptions};

    /// Opens a [`SqliteBackend`] in the working folder.
    #[derive(Debug, Clone, Default)]
    pub struct SqliteBackendFactory {
        options: SqliteOptions,
    }

    impl SqliteBackendFactory {
        pub fn new(options: SqliteOptions) -> Self {
            Self { options }
        }

        pub fn from_config(config: &BrokerConfig) -> Self {
            Self::new(SqliteOptions::from(config))
        }
    }

    impl BackendFactory for SqliteBackendFactory {
        fn open(&self, working_folder: &Path, _solution_path: &Path) -> StorageResult<BackendHandle> {
            Ok(Arc::new(SqliteBackend::open(working_folder, &self.options)?))
        }
    }
}

enum Recovery {
    FirstAttempt,
    Cleanup(StorageError),
    SecondAttempt,
    PermanentFallback(StorageError),
}

/// Opens a backend, deleting and retrying once if the store looks damaged.
///
/// Storage failures never escape: an irrecoverable failure is logged and
/// reported as `None`.
pub fn try_create(
    factory: &dyn BackendFactory,
    working_folder: &Path,
    solution_path: &Path,
) -> Option<BackendHandle> {
    let mut state = Recovery::FirstAttempt;
    loop {
        state = match state {
            Recovery::FirstAttempt => match factory.open(working_folder, solution_path) {
                Ok(backend) => return Some(backend),
                Err(err) if err.is_locked() => {
                    log::warn!(
                        "storage for {} is in use by another process: {}",
                        solution_path.display(),
                        err
                    );
                    return None;
                }
                Err(err) => Recovery::Cleanup(err),
            },
            Recovery::Cleanup(err) => {
                log::warn!(
                    "failed to open storage for {}, deleting {}: {}",
                    solution_path.display(),
                    working_folder.display(),
                    err
                );
                delete_working_folder(working_folder);
                Recovery::SecondAttempt
            }
            Recovery::SecondAttempt => match factory.open(working_folder, solution_path) {
                Ok(backend) => return Some(backend),
                Err(err) => Recovery::PermanentFallback(err),
            },
            Recovery::PermanentFallback(err) => {
                log::warn!(
                    "giving up on storage for {} after cleanup: {}",
                    solution_path.display(),
                    err
                );
                return None;
            }
        };
    }
}

/// Best-effort recursive delete. Errors are logged and swallowed.
pub(crate) fn delete_working_folder(working_folder: &Path) {
    match std::fs::remove_dir_all(working_folder) {
        Ok(()) => log::info!("deleted storage folder {}", working_folder.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => log::warn!("could not delete {}: {}", working_folder.display(), err),
    }
}

/// Path of the database file a factory would open inside `working_folder`.
pub fn database_path(working_folder: &Path, database_file_name: &str) -> PathBuf {
    working_folder.join(database_file_name)
}
