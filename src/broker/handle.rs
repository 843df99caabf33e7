use std::fmt::Debug;
use std::path::Path;
use std::sync::Weak;

use tokio::sync::oneshot;

use crate::errors::StorageResult;
use crate::storage::{BackendHandle, NoOpStorage, StorageBackend, StorageScope};

use super::{BackendId, BrokerInner};

/// Storage handed out by [`StorageBroker::get_storage`](super::StorageBroker::get_storage).
///
/// Dropping a `Real` handle releases its reference; the backend is closed
/// once the last reference is gone. `NoOp` handles hold nothing.
#[derive(Debug)]
pub enum StorageHandle {
    Real(RealStorage),
    NoOp(NoOpStorage),
}

impl StorageHandle {
    pub fn is_no_op(&self) -> bool {
        matches!(self, StorageHandle::NoOp(_))
    }

    pub fn is_real(&self) -> bool {
        matches!(self, StorageHandle::Real(_))
    }

    pub fn as_real(&self) -> Option<&RealStorage> {
        match self {
            StorageHandle::Real(real) => Some(real),
            StorageHandle::NoOp(_) => None,
        }
    }

    /// Path of the solution this handle was issued for, `None` for no-op storage.
    pub fn solution_path(&self) -> Option<&Path> {
        self.as_real().map(|real| real.solution_path.as_path())
    }

    fn backend(&self) -> &dyn StorageBackend {
        match self {
            StorageHandle::Real(real) => real.backend.as_ref(),
            StorageHandle::NoOp(noop) => noop,
        }
    }

    pub fn read(&self, scope: &StorageScope, name: &str) -> StorageResult<Option<Vec<u8>>> {
        self.backend().read(scope, name)
    }

    /// Returns `true` if the data was persisted.
    pub fn write(&self, scope: &StorageScope, name: &str, data: &[u8]) -> StorageResult<bool> {
        self.backend().write(scope, name, data)
    }

    pub fn remove(&self, scope: &StorageScope, name: &str) -> StorageResult<()> {
        self.backend().remove(scope, name)
    }

    pub fn contains(&self, scope: &StorageScope, name: &str) -> StorageResult<bool> {
        self.backend().contains(scope, name)
    }
}

/// A counted reference to a cached backend.
pub struct RealStorage {
    pub(super) id: BackendId,
    pub(super) solution_path: std::path::PathBuf,
    pub(super) backend: BackendHandle,
    pub(super) broker: Weak<BrokerInner>,
}

impl RealStorage {
    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }
}

impl Debug for RealStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealStorage")
            .field("id", &self.id)
            .field("solution_path", &self.solution_path)
            .finish_non_exhaustive()
    }
}

impl Drop for RealStorage {
    fn drop(&mut self) {
        // A broker that is already gone closed its backends on the way out.
        if let Some(inner) = self.broker.upgrade() {
            inner.release_reference(self.id);
        }
    }
}

/// Completion signal for the release of a primary solution's storage.
///
/// Resolves once the extra reference held for the primary solution has been
/// released, which closes the backend if nothing else holds it.
#[derive(Debug)]
pub struct Disposal {
    // None once completion has been observed
    rx: Option<oneshot::Receiver<()>>,
}

impl Disposal {
    pub(super) fn pending() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx: Some(rx) })
    }

    pub(super) fn completed() -> Self {
        Self { rx: None }
    }

    /// Blocks the current thread until disposal has finished.
    ///
    /// Must not be called from within an async context; use
    /// [`finished`](Self::finished) there.
    pub fn wait(self) {
        if let Some(rx) = self.rx {
            let _ = rx.blocking_recv();
        }
    }

    pub async fn finished(self) {
        if let Some(rx) = self.rx {
            let _ = rx.await;
        }
    }

    /// Non-blocking check.
    pub fn is_finished(&mut self) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return true;
        };
        match rx.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => false,
            _ => {
                self.rx = None;
                true
            }
        }
    }
}
