//! Per-solution persistent storage.
//!
//! The [`StorageBroker`] decides whether a solution gets a real on-disk
//! key/value store or a [`NoOpStorage`], caches at most one open backend per
//! solution path, and closes it once the last handle is released.
//!
//! - [`broker`]: the broker, its handles and the primary-solution protocol.
//! - [`factory`]: opening backends with delete-and-retry recovery.
//! - [`storage`]: the backend trait and its implementations.
//! - [`services`]: working-folder and size collaborators supplied by the host.

pub mod broker;
pub mod config;
pub mod errors;
pub mod factory;
pub mod services;
pub mod solution;
pub mod storage;

pub use broker::{Disposal, RealStorage, StorageBroker, StorageHandle};
pub use config::BrokerConfig;
pub use errors::{LifecycleMisuse, StorageError, StorageResult};
pub use factory::{BackendFactory, InMemoryBackendFactory};
#[cfg(feature = "sqlite_store")]
pub use factory::SqliteBackendFactory;
pub use services::{SizeTracker, WorkingFolderResolver};
pub use solution::{BranchId, SolutionId, SolutionSnapshot};
pub use storage::{BrokerEvent, FallbackReason, NoOpStorage, StorageBackend, StorageScope};
