//! The storage broker: one cached backend per solution path.
//!
//! [`StorageBroker`] decides, per request, whether a solution gets a real
//! on-disk backend or [`NoOpStorage`]. Real backends are cached by solution
//! path and reference counted; the last [`StorageHandle`] to go away closes
//! the backend.
//!
//! # Gating
//!
//! Real storage is only considered for the primary branch of a workspace
//! that supports persistence and has a solution file (test mode skips this
//! check). Small solutions (below
//! [`size_threshold`](crate::config::BrokerConfig::size_threshold)) only get
//! real storage when a database already exists in their working folder. The
//! negative decision is cached so the disk is not probed again until the
//! solution grows past the threshold.
//!
//! # Primary solution
//!
//! [`register_primary_solution`](StorageBroker::register_primary_solution)
//! marks a solution whose storage should stay open without explicit
//! handles. The first backend created for that solution receives an extra
//! reference, dropped again by
//! [`unregister_primary_solution`](StorageBroker::unregister_primary_solution).
//!
//! # Concurrency
//!
//! One mutex guards the cache, the open backends and the primary
//! registration. Backend I/O through a handle never takes it.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use solution_storage::{StorageBroker, StorageScope};
//! use solution_storage::config::BrokerConfig;
//! use solution_storage::services::{HiddenFolderResolver, InMemorySizeTracker};
//! use solution_storage::solution::{SolutionId, SolutionSnapshot};
//!
//! let broker = StorageBroker::with_sqlite(
//!     BrokerConfig::default(),
//!     Arc::new(HiddenFolderResolver::default()),
//!     Arc::new(InMemorySizeTracker::new()),
//! );
//!
//! let solution = SolutionSnapshot::primary(SolutionId::new(), Some("/src/App.sln".into()));
//! let storage = broker.get_storage(&solution);
//! storage.write(&StorageScope::Solution, "index", b"...").unwrap();
//! broker.release(storage);
//! ```

mod handle;

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use handle::{Disposal, RealStorage, StorageHandle};

use crate::config::BrokerConfig;
use crate::errors::{LifecycleMisuse, StorageResult};
use crate::factory::{self, BackendFactory};
use crate::services::{SizeTracker, WorkingFolderResolver};
use crate::solution::{SolutionId, SolutionSnapshot};
use crate::storage::event::EventBus;
use crate::storage::{BackendHandle, BrokerEvent, FallbackReason, NoOpStorage, Subscription};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct BackendId(u64);

/// An open backend and the number of references handed out for it.
struct OpenBackend {
    path: PathBuf,
    backend: BackendHandle,
    refs: usize,
}

impl OpenBackend {
    fn add_ref(&mut self) {
        self.refs += 1;
    }

    /// Returns the remaining count.
    fn release_ref(&mut self) -> usize {
        self.refs = self.refs.saturating_sub(1);
        self.refs
    }
}

/// Cached decision for one solution path. `backend: None` remembers a
/// declined or failed attempt.
struct CacheEntry {
    working_folder: PathBuf,
    backend: Option<BackendId>,
}

struct PrimaryRegistration {
    id: SolutionId,
    bound: Option<BackendId>,
}

#[derive(Default)]
struct BrokerState {
    entries: HashMap<PathBuf, CacheEntry>,
    // Evicted entries stay here until their last reference is released.
    open: HashMap<BackendId, OpenBackend>,
    primary: Option<PrimaryRegistration>,
    last_solution_path: Option<PathBuf>,
    next_id: u64,
}

impl BrokerState {
    fn allocate_id(&mut self) -> BackendId {
        self.next_id += 1;
        BackendId(self.next_id)
    }
}

pub(crate) struct BrokerInner {
    config: BrokerConfig,
    resolver: Arc<dyn WorkingFolderResolver>,
    size_tracker: Arc<dyn SizeTracker>,
    factory: Arc<dyn BackendFactory>,
    state: Mutex<BrokerState>,
    bus: EventBus,
}

impl BrokerInner {
    // Every mutation of the state is completed before the guard drops, so a
    // poisoned lock still protects consistent data.
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_below_threshold(&self, id: SolutionId) -> bool {
        let size = self.size_tracker.solution_size(id).unwrap_or(0);
        self.config.is_below_threshold(size)
    }

    fn no_op(&self, path: Option<&Path>, reason: FallbackReason) -> StorageHandle {
        log::debug!("no-op storage for {:?}: {:?}", path, reason);
        self.bus.publish(BrokerEvent::FellBackToNoOp {
            path: path.map(Path::to_path_buf),
            reason,
        });
        StorageHandle::NoOp(NoOpStorage::new())
    }

    fn real(self: &Arc<Self>, id: BackendId, path: &Path, backend: BackendHandle) -> StorageHandle {
        StorageHandle::Real(RealStorage {
            id,
            solution_path: path.to_path_buf(),
            backend,
            broker: Arc::downgrade(self),
        })
    }

    fn get_or_create_entry(
        self: &Arc<Self>,
        state: &mut BrokerState,
        path: &Path,
        working_folder: &Path,
        solution: &SolutionSnapshot,
    ) -> StorageHandle {
        let below_threshold = self.is_below_threshold(solution.id);

        if let Some(entry) = state.entries.get(path) {
            match entry.backend {
                None if below_threshold => {
                    return self.no_op(Some(path), FallbackReason::PreviousFailure);
                }
                Some(id) if entry.working_folder.as_path() == working_folder => {
                    if let Some(open) = state.open.get_mut(&id) {
                        if !open.backend.is_closed() {
                            open.add_ref();
                            let backend = open.backend.clone();
                            return self.real(id, path, backend);
                        }
                    }
                    if state.open.remove(&id).is_some() {
                        log::warn!("cached storage for {} was closed externally", path.display());
                    }
                }
                _ => {}
            }
            log::debug!("evicting storage entry for {}", path.display());
            state.entries.remove(path);
        }

        let database = factory::database_path(working_folder, &self.config.database_file_name);
        if below_threshold && !database.exists() {
            state.entries.insert(
                path.to_path_buf(),
                CacheEntry {
                    working_folder: working_folder.to_path_buf(),
                    backend: None,
                },
            );
            return self.no_op(Some(path), FallbackReason::BelowThreshold);
        }

        let Some(backend) = factory::try_create(self.factory.as_ref(), working_folder, path) else {
            state.entries.insert(
                path.to_path_buf(),
                CacheEntry {
                    working_folder: working_folder.to_path_buf(),
                    backend: None,
                },
            );
            return self.no_op(Some(path), FallbackReason::FactoryFailed);
        };

        let id = state.allocate_id();
        let mut open = OpenBackend {
            path: path.to_path_buf(),
            backend: backend.clone(),
            refs: 0,
        };

        // Hold on to the primary solution's storage the first time it is created.
        if let Some(primary) = state
            .primary
            .as_mut()
            .filter(|p| p.id == solution.id && p.bound.is_none())
        {
            primary.bound = Some(id);
            open.add_ref();
            log::debug!("bound storage for {} to primary solution {}", path.display(), solution.id);
        }

        open.add_ref();
        state.open.insert(id, open);
        state.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                working_folder: working_folder.to_path_buf(),
                backend: Some(id),
            },
        );

        log::info!(
            "opened storage for {} in {}",
            path.display(),
            working_folder.display()
        );
        self.bus.publish(BrokerEvent::BackendOpened {
            path: path.to_path_buf(),
            working_folder: working_folder.to_path_buf(),
        });

        self.real(id, path, backend)
    }

    pub(crate) fn release_reference(&self, id: BackendId) {
        let mut state = self.lock();
        self.release_locked(&mut state, id);
    }

    fn release_locked(&self, state: &mut BrokerState, id: BackendId) {
        let Some(open) = state.open.get_mut(&id) else {
            log::debug!("ignoring release of unknown backend {:?}", id);
            return;
        };
        if open.release_ref() > 0 {
            return;
        }
        let Some(open) = state.open.remove(&id) else {
            return;
        };

        if state.entries.get(&open.path).and_then(|e| e.backend) == Some(id) {
            state.entries.remove(&open.path);
        }
        open.backend.close();

        log::info!("closed storage for {}", open.path.display());
        self.bus.publish(BrokerEvent::BackendClosed { path: open.path });
    }

    fn dispose_in_background(self: &Arc<Self>, id: BackendId) -> Disposal {
        let (tx, disposal) = Disposal::pending();
        let inner = Arc::clone(self);
        let task = move || {
            inner.release_reference(id);
            let _ = tx.send(());
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(task);
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("storage-dispose".to_string())
                    .spawn(task);
                if let Err(err) = spawned {
                    log::warn!("cannot spawn disposal thread, disposing inline: {err}");
                    self.release_reference(id);
                }
            }
        }

        disposal
    }
}

impl Drop for BrokerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, open) in state.open.drain() {
            open.backend.close();
        }
    }
}

/// Hands out per-solution storage and owns every backend it opens.
///
/// Cloning is cheap and yields another handle to the same broker.
#[derive(Clone)]
pub struct StorageBroker {
    inner: Arc<BrokerInner>,
}

impl Debug for StorageBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBroker")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl StorageBroker {
    pub fn new(
        config: BrokerConfig,
        resolver: Arc<dyn WorkingFolderResolver>,
        size_tracker: Arc<dyn SizeTracker>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        let bus = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(BrokerInner {
                config,
                resolver,
                size_tracker,
                factory,
                state: Mutex::new(BrokerState::default()),
                bus,
            }),
        }
    }

    /// A broker that persists to SQLite databases.
    #[cfg(feature = "sqlite_store")]
    pub fn with_sqlite(
        config: BrokerConfig,
        resolver: Arc<dyn WorkingFolderResolver>,
        size_tracker: Arc<dyn SizeTracker>,
    ) -> Self {
        let factory = Arc::new(factory::SqliteBackendFactory::from_config(&config));
        Self::new(config, resolver, size_tracker, factory)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    /// Whether `solution` may use real storage at all.
    pub fn should_use_real_storage(&self, solution: &SolutionSnapshot) -> bool {
        if self.inner.config.test_mode {
            return true;
        }
        solution.is_primary_branch() && solution.supports_persistence && solution.path.is_some()
    }

    /// Returns storage for `solution`.
    ///
    /// Never fails: whenever real storage is not warranted or cannot be
    /// opened, a no-op handle is returned. Each real handle holds one
    /// reference until it is released or dropped.
    pub fn get_storage(&self, solution: &SolutionSnapshot) -> StorageHandle {
        if !self.should_use_real_storage(solution) {
            return self.inner.no_op(solution.file_path(), FallbackReason::Gated);
        }
        let Some(path) = solution.file_path() else {
            return self.inner.no_op(None, FallbackReason::NoSolutionPath);
        };

        let mut state = self.inner.lock();

        // The solution file may have been renamed or deleted since we last saw it.
        if state.last_solution_path.as_deref() != Some(path) {
            if !path.exists() {
                return self.inner.no_op(Some(path), FallbackReason::StaleSolutionPath);
            }
            state.last_solution_path = Some(path.to_path_buf());
        }

        let Some(working_folder) = self.inner.resolver.working_folder(solution) else {
            return self.inner.no_op(Some(path), FallbackReason::NoWorkingFolder);
        };

        self.inner
            .get_or_create_entry(&mut state, path, &working_folder, solution)
    }

    /// Gives back a handle obtained from [`get_storage`](Self::get_storage).
    /// Equivalent to dropping it.
    pub fn release(&self, handle: StorageHandle) {
        if let StorageHandle::Real(real) = &handle {
            if !std::ptr::eq(real.broker.as_ptr(), Arc::as_ptr(&self.inner)) {
                log::warn!(
                    "storage for {} released through a broker that did not issue it",
                    real.solution_path.display()
                );
            }
        }
        drop(handle);
    }

    /// Marks `id` as the primary solution. Storage is not created eagerly.
    ///
    /// Fails while another registration is outstanding, or while a backend
    /// is still bound to the current one.
    pub fn register_primary_solution(&self, id: SolutionId) -> StorageResult<()> {
        let mut state = self.inner.lock();
        let misuse = match &state.primary {
            None => None,
            Some(PrimaryRegistration { id: current, bound: Some(_) }) => {
                Some(LifecycleMisuse::PrimaryAlreadyBound {
                    current: *current,
                    requested: id,
                })
            }
            Some(PrimaryRegistration { id: current, bound: None }) if *current != id => {
                Some(LifecycleMisuse::PrimaryAlreadyRegistered {
                    current: *current,
                    requested: id,
                })
            }
            Some(_) => return Ok(()),
        };
        if let Some(misuse) = misuse {
            log::error!("{misuse}");
            return Err(misuse.into());
        }

        state.primary = Some(PrimaryRegistration { id, bound: None });
        self.inner.bus.publish(BrokerEvent::PrimaryRegistered { id });
        Ok(())
    }

    /// Ends the primary registration of `id`.
    ///
    /// Returns `Ok(None)` when nothing was registered or no backend was bound.
    /// Otherwise the extra reference is released inline (`synchronous`) or on
    /// a background task, and the returned [`Disposal`] tracks completion.
    pub fn unregister_primary_solution(
        &self,
        id: SolutionId,
        synchronous: bool,
    ) -> StorageResult<Option<Disposal>> {
        let bound = {
            let mut state = self.inner.lock();
            let Some(registered) = state.primary.as_ref().map(|p| p.id) else {
                return Ok(None);
            };
            if registered != id {
                let misuse = LifecycleMisuse::PrimaryMismatch {
                    registered,
                    requested: id,
                };
                log::error!("{misuse}");
                return Err(misuse.into());
            }

            let bound = state.primary.take().and_then(|p| p.bound);
            self.inner.bus.publish(BrokerEvent::PrimaryUnregistered { id });
            bound
        };

        let Some(bound) = bound else {
            return Ok(None);
        };

        if synchronous {
            self.inner.release_reference(bound);
            Ok(Some(Disposal::completed()))
        } else {
            Ok(Some(self.inner.dispose_in_background(bound)))
        }
    }

    /// Closes every backend and forgets all cached decisions and the
    /// primary registration. Outstanding handles keep working only as far as
    /// their backend allows after close.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        state.entries.clear();
        state.primary = None;
        state.last_solution_path = None;
        for (_, open) in state.open.drain() {
            open.backend.close();
            self.inner.bus.publish(BrokerEvent::BackendClosed { path: open.path });
        }
        log::info!("storage broker shut down");
    }

    /// Solution paths with a cache entry, including remembered failures.
    pub fn cached_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.inner.lock().entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// References held on the cached backend for `path`.
    ///
    /// `None` without an entry, `Some(0)` for a remembered failure.
    pub fn ref_count(&self, path: &Path) -> Option<usize> {
        let state = self.inner.lock();
        let entry = state.entries.get(path)?;
        Some(
            entry
                .backend
                .and_then(|id| state.open.get(&id))
                .map(|open| open.refs)
                .unwrap_or(0),
        )
    }

    /// The solution whose registration is outstanding, if any.
    pub fn primary_solution(&self) -> Option<SolutionId> {
        self.inner.lock().primary.as_ref().map(|p| p.id)
    }
}
