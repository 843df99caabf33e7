//! Storage backends managed by the broker.
//!
//! This module defines the [`StorageBackend`] trait and its implementations.
//! The broker never talks to a storage engine directly; it only holds
//! [`BackendHandle`]s minted by a [`BackendFactory`](crate::factory::BackendFactory).
//!
//! # Available types
//!
//! - [`StorageBackend`]: Trait for any key/value store the broker can hand out.
//! - [`StorageScope`]: Which part of a solution an entry belongs to.
//! - [`NoOpStorage`]: Accepts writes, reports every read as a miss.
//! - [`InMemoryBackend`]: Map-backed store for ephemeral workspaces and tests.
//! - [`SqliteBackend`]: SQLite-backed persistent store (feature `sqlite_store`).
//! - [`BrokerEvent`]: Describes a lifecycle change inside the broker.
//!
//! # Choosing a backend
//!
//! - For persistent storage next to a solution, use [`SqliteBackend`].
//! - For workspaces that must never touch disk, use [`InMemoryBackend`].
//! - [`NoOpStorage`] is what the broker returns when persistence is not
//!   warranted; you rarely construct it yourself.

use std::sync::Arc;

/// Backend trait and scope keys.
pub mod backend;
/// Broker lifecycle events.
pub mod event;
/// In-memory backend.
pub mod in_memory;
/// No-op backend.
pub mod noop;
/// SQLite-backed persistent backend.
#[cfg(feature = "sqlite_store")]
pub mod sqlite_store;

pub use backend::{StorageBackend, StorageScope};
pub use event::{BrokerEvent, FallbackReason, Subscription};
pub use in_memory::InMemoryBackend;
pub use noop::NoOpStorage;
#[cfg(feature = "sqlite_store")]
pub use sqlite_store::SqliteBackend;

/// Shared handle to an open backend.
pub type BackendHandle = Arc<dyn StorageBackend>;
