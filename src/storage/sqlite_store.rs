//! SQLite-backed storage backend.
//!
//! `SqliteBackend` keeps one database file inside the solution's working
//! folder. All scopes share a single `storage` table keyed by
//! `(scope, name)`. Access goes through an `r2d2` pool so that every holder
//! of the broker handle can read and write concurrently.
//!
//! ## Opening
//! [`SqliteBackend::open`] first opens a probe connection and initializes the
//! schema on it. Failures on the probe are classified:
//! - `SQLITE_BUSY` / `SQLITE_LOCKED` become
//!   [`StorageError::LockedByOtherProcess`];
//! - anything else becomes [`StorageError::CorruptOrUnreadableStore`].
//!
//! The probe connection is dropped before the pool is built, so a failed
//! open never leaves a file handle behind.
//!
//! ## Closing
//! [`close`](StorageBackend::close) drops the pool. Later calls fail with
//! [`StorageError::Closed`].

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::BrokerConfig;
use crate::errors::{StorageError, StorageResult};
use crate::storage::backend::{StorageBackend, StorageScope};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS storage (
    scope TEXT NOT NULL,
    name TEXT NOT NULL,
    value BLOB NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now')),
    PRIMARY KEY(scope, name)
);";

/// Tuning for a SQLite backend, usually taken from [`BrokerConfig`].
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub database_file_name: String,
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl From<&BrokerConfig> for SqliteOptions {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            database_file_name: config.database_file_name.clone(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            max_connections: config.max_connections,
        }
    }
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

/// SQLite-based persistent storage for one solution.
pub struct SqliteBackend {
    working_folder: PathBuf,
    database_path: PathBuf,
    pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
}

impl SqliteBackend {
    /// Opens (or creates) the database inside `working_folder`.
    pub fn open(working_folder: &Path, options: &SqliteOptions) -> StorageResult<Self> {
        std::fs::create_dir_all(working_folder)?;
        let database_path = working_folder.join(&options.database_file_name);
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;

        {
            let probe = Connection::open_with_flags(&database_path, flags)
                .map_err(|e| classify(&database_path, e))?;
            init_connection(&probe, options.busy_timeout)
                .and_then(|_| probe.execute_batch(SCHEMA))
                .and_then(|_| {
                    probe.query_row("SELECT COUNT(*) FROM storage", [], |row| row.get::<_, i64>(0))
                })
                .map_err(|e| classify(&database_path, e))?;
        }

        let busy_timeout = options.busy_timeout;
        let manager = SqliteConnectionManager::file(&database_path)
            .with_flags(flags)
            .with_init(move |c| init_connection(c, busy_timeout));

        let pool = Pool::builder()
            .max_size(options.max_connections)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .map_err(|e| StorageError::CorruptOrUnreadableStore {
                path: database_path.clone(),
                reason: e.to_string(),
            })?;

        log::debug!("opened sqlite storage at {}", database_path.display());

        Ok(Self {
            working_folder: working_folder.to_path_buf(),
            database_path,
            pool: RwLock::new(Some(pool)),
        })
    }

    pub fn working_folder(&self) -> &Path {
        &self.working_folder
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    fn conn(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        let pool = self
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StorageError::Closed)?;
        Ok(pool.get()?)
    }
}

fn init_connection(c: &Connection, busy_timeout: Duration) -> Result<(), r2d2_sqlite::rusqlite::Error> {
    c.busy_timeout(busy_timeout)?;
    c.pragma_update(None, "journal_mode", "WAL")?;
    Ok(())
}

/// Maps an engine error raised while opening into the broker's taxonomy.
pub(crate) fn classify(path: &Path, err: r2d2_sqlite::rusqlite::Error) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StorageError::LockedByOtherProcess(path.to_path_buf())
        }
        _ => StorageError::CorruptOrUnreadableStore {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
    }
}

impl StorageBackend for SqliteBackend {
    fn read(&self, scope: &StorageScope, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM storage WHERE scope=?1 AND name=?2",
                params![scope.key(), name],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, scope: &StorageScope, name: &str, data: &[u8]) -> StorageResult<bool> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO storage(scope,name,value) VALUES (?1,?2,?3)
             ON CONFLICT(scope,name) DO UPDATE
             SET value=excluded.value, updated_at=strftime('%s','now')",
            params![scope.key(), name, data],
        )?;
        Ok(true)
    }

    fn remove(&self, scope: &StorageScope, name: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM storage WHERE scope=?1 AND name=?2",
            params![scope.key(), name],
        )?;
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM storage", [], |row| row.get::<_, i64>(0))?;
        Ok(count.max(0) as usize)
    }

    fn close(&self) {
        let pool = self.pool.write().unwrap_or_else(PoisonError::into_inner).take();
        if pool.is_some() {
            log::debug!("closed sqlite storage at {}", self.database_path.display());
        }
    }

    fn is_closed(&self) -> bool {
        self.pool.read().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}
