//! SQLite connection pool
//!
//! SQLite needs separate connections for true concurrency: under WAL any
//! number of readers proceed alongside the single writer, but only on distinct
//! connections. Pooling is delegated to `r2d2` over `r2d2_sqlite`; this module
//! maps [`PoolConfig`] onto the pool builder and the pool's errors onto
//! [`KvError`].
//!
//! A connection returned while still inside a transaction (a failed `COMMIT`
//! or `ROLLBACK`) is reported broken by [`ConnectionManager`] and closed
//! instead of being reused.

use kvstore_core::{observe, KvError, PoolConfig, Result};
use r2d2::{CustomizeConnection, HandleError, ManageConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::time::Instant;

/// A connection checked out of a [`ConnectionPool`]
///
/// Returned to the pool when dropped.
pub type PooledConnection = r2d2::PooledConnection<ConnectionManager>;

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub open: usize,
    pub idle: usize,
    pub max_open: usize,
}

impl PoolStats {
    pub fn in_use(&self) -> usize {
        self.open.saturating_sub(self.idle)
    }
}

/// `r2d2` manager for SQLite connections
///
/// Delegates to [`SqliteConnectionManager`] and additionally treats a
/// connection outside autocommit mode as broken.
pub struct ConnectionManager {
    inner: SqliteConnectionManager,
}

impl ConnectionManager {
    pub fn new(inner: SqliteConnectionManager) -> Self {
        Self { inner }
    }
}

impl ManageConnection for ConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> std::result::Result<Connection, rusqlite::Error> {
        self.inner.connect()
    }

    fn is_valid(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        self.inner.is_valid(conn)
    }

    fn has_broken(&self, conn: &mut Connection) -> bool {
        !conn.is_autocommit()
    }
}

/// Routes pool-internal connection errors to `tracing`
#[derive(Debug)]
struct TracingErrorHandler;

impl HandleError<rusqlite::Error> for TracingErrorHandler {
    fn handle_error(&self, error: rusqlite::Error) {
        tracing::warn!(error = %error, "Pooled connection error");
    }
}

/// Bounded pool of SQLite connections to one database file
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(SqliteConnectionManager::file(&path));
/// let pool = ConnectionPool::new(PoolConfig::default(), manager, Tuning::from(&config))?;
///
/// let conn = pool.acquire()?;
/// let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
/// // Connection is returned to pool when `conn` is dropped
/// ```
pub struct ConnectionPool {
    pool: r2d2::Pool<ConnectionManager>,
    config: PoolConfig,
}

impl ConnectionPool {
    /// Build the pool, opening `min_idle` connections up front
    ///
    /// `customizer` runs once on every new physical connection.
    pub fn new<T>(config: PoolConfig, manager: ConnectionManager, customizer: T) -> Result<Self>
    where
        T: CustomizeConnection<Connection, rusqlite::Error>,
    {
        config.validate()?;

        let pool = r2d2::Pool::builder()
            .max_size(to_u32(config.max_open))
            .min_idle(Some(to_u32(config.min_idle)))
            .max_lifetime(config.max_lifetime())
            .idle_timeout(config.idle_timeout())
            .connection_timeout(config.acquire_timeout())
            .connection_customizer(Box::new(customizer))
            .error_handler(Box::new(TracingErrorHandler))
            .build(manager)
            .map_err(|e| KvError::Initialization(format!("connection pool: {}", e)))?;

        tracing::debug!(
            max_open = config.max_open,
            min_idle = config.min_idle,
            "Built connection pool"
        );
        Ok(Self { pool, config })
    }

    /// Check out a connection
    ///
    /// Waits up to the configured timeout for a connection to become
    /// available, then fails with [`KvError::Timeout`].
    pub fn acquire(&self) -> Result<PooledConnection> {
        let started = Instant::now();
        let conn = self.pool.get().map_err(|e| {
            KvError::Timeout(format!(
                "Connection pool acquire timeout after {:?} ({} connections in use): {}",
                self.config.acquire_timeout(),
                self.stats().in_use(),
                e
            ))
        })?;
        observe::record_pool_wait(started.elapsed());
        Ok(conn)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            open: state.connections as usize,
            idle: state.idle_connections as usize,
            max_open: self.config.max_open,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
