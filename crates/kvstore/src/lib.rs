//! kvstore: a typed key/value store on SQLite
//!
//! kvstore provides:
//! - **Typed stores**: serde keys and values over one table each, many tables per file
//! - **Ordered iteration**: forward or backward over encoded keys, with early stop
//! - **Watchers**: per-key and prefix change events, delivered in mutation order
//! - **Transactions**: atomic, isolated units of work with a deadline
//!
//! # Quick Start
//!
//! ```no_run
//! use kvstore::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let users: Store<String, u32> = kvstore::open_at("./data/app.db", "users")?;
//!
//! let (events, cancel) = users.watch_prefix("user:");
//! users.set("user:1".to_string(), 18)?;
//! assert_eq!(events.recv().unwrap().value, Some(18));
//! cancel.cancel();
//!
//! users.run_transaction(|tx| {
//!     tx.update("user:1", |age| Ok(age.unwrap_or(0) + 1))?;
//!     Ok(())
//! })?;
//! assert_eq!(users.get("user:1")?, 19);
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod prelude;

// Re-export core types
pub use kvstore_core::{
    config, observe, BackendConfig, CancelHandle, ChangeEvent, ChangeKind, Codec, Direction,
    JsonCodec, KvError, Matcher, PoolConfig, Result, StoreConfig, SynchronousMode,
    WatcherRegistry,
};

// Re-export implementations
pub use kvstore_sqlite::{
    Backend, ConnectionPool, PoolStats, PooledConnection, Store, Transaction, TransactionContext,
};

pub use db::KvDb;

use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Open a store on the process-wide shared database
pub fn open<K, V>(table: &str) -> Result<Store<K, V>>
where
    K: Serialize + DeserializeOwned + Clone + Send + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    KvDb::shared()?.store(table)
}

/// Open a store on a dedicated database at `path`
pub fn open_at<K, V, P>(path: P, table: &str) -> Result<Store<K, V>>
where
    K: Serialize + DeserializeOwned + Clone + Send + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + 'static,
    P: AsRef<Path>,
{
    KvDb::open(path)?.store(table)
}
