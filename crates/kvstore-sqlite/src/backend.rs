//! Backend handle: one SQLite database file behind a connection pool
//!
//! Any number of stores (tables) may share one handle. Tuning is applied by
//! the pool to each physical connection when it is opened; the journal mode
//! is persistent in the database file and is set once, at open.

use crate::pool::{ConnectionManager, ConnectionPool, PoolStats, PooledConnection};
use kvstore_core::config::location;
use kvstore_core::{BackendConfig, KvError, Result, SynchronousMode};
use parking_lot::Mutex;
use r2d2::{CustomizeConnection, ManageConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static SHARED: OnceLock<Arc<Backend>> = OnceLock::new();
static SHARED_INIT: Mutex<()> = parking_lot::const_mutex(());

/// Handle to one database file
pub struct Backend {
    config: BackendConfig,
    pool: ConnectionPool,
}

impl Backend {
    /// Open a dedicated handle
    ///
    /// Creates parent directories as needed. Fails with
    /// [`KvError::Initialization`] if the path is unusable or any tuning
    /// statement fails.
    pub fn open(config: BackendConfig) -> Result<Arc<Self>> {
        config.pool.validate()?;

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    KvError::Initialization(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let manager = ConnectionManager::new(
            SqliteConnectionManager::file(&config.path).with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
        );
        let tuning = Tuning::from(&config);

        // Fail fast on an unusable file instead of waiting out the pool timeout
        let mut first = manager.connect().map_err(|e| {
            KvError::Initialization(format!("cannot open {}: {}", config.path.display(), e))
        })?;
        tuning
            .on_acquire(&mut first)
            .map_err(|e| KvError::Initialization(format!("connection tuning: {}", e)))?;

        if config.wal_mode {
            let mode: String = first
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(|e| KvError::Initialization(format!("journal_mode: {}", e)))?;
            if !mode.eq_ignore_ascii_case("wal") {
                return Err(KvError::Initialization(format!(
                    "journal_mode=WAL not applied (database reports {})",
                    mode
                )));
            }
        }
        drop(first);

        let pool = ConnectionPool::new(config.pool.clone(), manager, tuning)?;

        tracing::info!(
            path = %config.path.display(),
            wal = config.wal_mode,
            max_open = config.pool.max_open,
            "Opened kvstore backend"
        );

        Ok(Arc::new(Self { config, pool }))
    }

    /// Open a dedicated handle at `path` with default tuning
    pub fn open_at(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Self::open(BackendConfig::new(path.as_ref()))
    }

    /// The process-wide shared handle
    ///
    /// Created on first call at [`location::shared_db_path`]; later calls
    /// return the same handle. It lives until the process exits. A failed
    /// initialization is not cached, so a later call retries.
    pub fn open_shared() -> Result<Arc<Self>> {
        if let Some(shared) = SHARED.get() {
            return Ok(Arc::clone(shared));
        }

        let _init = SHARED_INIT.lock();
        if let Some(shared) = SHARED.get() {
            return Ok(Arc::clone(shared));
        }

        let path = location::shared_db_path();
        let backend = Self::open(BackendConfig::new(&path))?;
        // Cannot be occupied: every writer holds SHARED_INIT
        let _ = SHARED.set(Arc::clone(&backend));
        tracing::info!(path = %path.display(), "Initialized shared kvstore backend");
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Check out a connection from the pool
    pub fn acquire(&self) -> Result<PooledConnection> {
        self.pool.acquire()
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("path", &self.config.path)
            .field("pool", &self.pool.stats())
            .finish()
    }
}

/// Per-connection tuning, applied by the pool to every new connection
#[derive(Debug, Clone, Copy)]
struct Tuning {
    busy_timeout: Duration,
    synchronous: SynchronousMode,
    cache_size: i32,
}

impl From<&BackendConfig> for Tuning {
    fn from(config: &BackendConfig) -> Self {
        Self {
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            synchronous: config.synchronous,
            cache_size: config.cache_size,
        }
    }
}

impl CustomizeConnection<Connection, rusqlite::Error> for Tuning {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "synchronous", self.synchronous.as_pragma())?;
        conn.pragma_update(None, "cache_size", self.cache_size)?;
        Ok(())
    }
}
