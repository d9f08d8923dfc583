//! SQLite-backed key/value store
//!
//! Provides typed stores over tables of one SQLite database file.
//!
//! Key features:
//! - Connection pool with lazily opened, lifetime-bounded connections
//! - WAL mode so readers never block the writer
//! - Per-key and prefix change notification with backpressure
//! - Atomic transactions with a deadline

pub mod backend;
pub mod pool;
pub mod schema;
pub mod store;
mod table;
pub mod txn;

pub use backend::Backend;
pub use pool::{ConnectionManager, ConnectionPool, PoolStats, PooledConnection};
pub use store::Store;
pub use txn::{Transaction, TransactionContext};
