//! Atomic, isolated units of work over one store
//!
//! A transaction holds one pooled connection inside `BEGIN IMMEDIATE` for its
//! whole extent. Writes made through the [`TransactionContext`] are visible to
//! later reads in the same context and to nobody else until commit; readers
//! on other connections keep seeing the last committed state.
//!
//! Transactional mutations do not notify watchers, neither during the unit of
//! work nor after commit.
//!
//! # Example
//!
//! ```no_run
//! use kvstore_sqlite::{Backend, Store};
//!
//! # fn main() -> kvstore_core::Result<()> {
//! let backend = Backend::open_at("/tmp/bank.db")?;
//! let accounts: Store<String, i64> = Store::open(backend, "accounts")?;
//!
//! accounts.run_transaction(|tx| {
//!     let from = tx.get("alice")?;
//!     if from < 50 {
//!         return Err(anyhow::anyhow!("insufficient balance").into());
//!     }
//!     tx.set("alice".to_string(), from - 50)?;
//!     tx.update("bob", |balance| Ok(balance.unwrap_or(0) + 50))?;
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

use crate::pool::PooledConnection;
use crate::store::Store;
use crate::table::Table;
use kvstore_core::{observe, Codec, Direction, JsonCodec, KvError, Result};
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Serialize};
use std::borrow::Borrow;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

/// Explicit `BEGIN IMMEDIATE` on a pooled connection
///
/// Rolls back on drop unless committed. If the connection is still inside a
/// transaction when it goes back to the pool, the pool closes it.
pub(crate) struct WriteTxn {
    conn: PooledConnection,
    active: bool,
}

impl WriteTxn {
    pub fn begin(conn: PooledConnection) -> rusqlite::Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self { conn, active: true })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn commit(mut self) -> rusqlite::Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.active = false;
        Ok(())
    }

    pub fn rollback(mut self) -> rusqlite::Result<()> {
        self.active = false;
        self.conn.execute_batch("ROLLBACK")
    }
}

impl Drop for WriteTxn {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "Rollback on drop failed");
        }
    }
}

/// Scoped view of one store bound to a pending transaction
///
/// Not shareable across threads; it belongs to exactly one unit of work.
pub struct TransactionContext<'a, K, V, C = JsonCodec> {
    txn: WriteTxn,
    table: &'a Table<C>,
    deadline: Instant,
    timeout: Duration,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<'a, K, V, C> TransactionContext<'a, K, V, C>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
    C: Codec,
{
    fn check_deadline(&self) -> Result<()> {
        if Instant::now() >= self.deadline {
            return Err(KvError::Transaction(format!(
                "deadline of {:?} exceeded",
                self.timeout
            )));
        }
        Ok(())
    }

    /// Get a value, seeing this transaction's own uncommitted writes
    pub fn get<Q>(&self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        self.check_deadline()?;
        let encoded = self.table.codec().encode(key)?;
        self.table
            .fetch(self.txn.conn(), &encoded)?
            .ok_or_else(|| self.table.not_found(&encoded))
    }

    /// Get a value, or `default` on any failure
    ///
    /// Unlike [`Store::get_or`], decode and storage errors also yield the
    /// default.
    pub fn get_or<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        match self.get(key) {
            Ok(value) => value,
            Err(e) => {
                if !e.is_not_found() {
                    tracing::debug!(error = %e, "Transactional get_or fell back to default");
                }
                default
            }
        }
    }

    /// Get a value, returning None if the key doesn't exist
    pub fn get_opt<Q>(&self, key: &Q) -> Result<Option<V>>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        self.check_deadline()?;
        let encoded = self.table.codec().encode(key)?;
        self.table.fetch(self.txn.conn(), &encoded)
    }

    pub fn has<Q>(&self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        self.check_deadline()?;
        let encoded = self.table.codec().encode(key)?;
        self.table.exists(self.txn.conn(), &encoded)
    }

    /// Insert or replace a record
    pub fn set(&mut self, key: K, value: V) -> Result<V> {
        self.check_deadline()?;
        let codec = self.table.codec();
        let encoded_key = codec.encode(&key)?;
        let encoded_value = codec.encode(&value)?;
        self.table.put(self.txn.conn(), &encoded_key, &encoded_value)?;
        Ok(value)
    }

    /// Remove a record; returns whether one existed
    pub fn delete<Q>(&mut self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        self.check_deadline()?;
        let encoded = self.table.codec().encode(key)?;
        Ok(self.table.remove(self.txn.conn(), &encoded)? > 0)
    }

    /// Update a key with a function
    ///
    /// Reads the current value, applies the function, and writes the result.
    /// If the key doesn't exist, passes None to the function.
    pub fn update<Q, F>(&mut self, key: &Q, f: F) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
        F: FnOnce(Option<V>) -> Result<V>,
    {
        self.check_deadline()?;
        let codec = self.table.codec();
        let encoded_key = codec.encode(key)?;
        let current = self.table.fetch(self.txn.conn(), &encoded_key)?;
        let next = f(current)?;
        self.table
            .put(self.txn.conn(), &encoded_key, &codec.encode(&next)?)?;
        Ok(next)
    }

    /// Delete every record in the table
    pub fn clear(&mut self) -> Result<()> {
        self.check_deadline()?;
        self.table.truncate(self.txn.conn())?;
        Ok(())
    }

    pub fn for_each<F>(&self, direction: Direction, f: F) -> Result<()>
    where
        F: FnMut(K, V) -> Result<ControlFlow<()>>,
    {
        self.check_deadline()?;
        self.table.scan(self.txn.conn(), direction, f)
    }

    pub fn keys<F>(&self, direction: Direction, f: F) -> Result<()>
    where
        F: FnMut(K) -> Result<ControlFlow<()>>,
    {
        self.check_deadline()?;
        self.table.scan_keys(self.txn.conn(), direction, f)
    }

    pub fn len(&self) -> Result<u64> {
        self.check_deadline()?;
        self.table.count(self.txn.conn())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn commit(self) -> Result<()> {
        if let Err(expired) = self.check_deadline() {
            return match self.txn.rollback() {
                Ok(()) => Err(expired),
                Err(e) => Err(KvError::RollbackFailed {
                    rollback: e.to_string(),
                    source: Box::new(expired),
                }),
            };
        }
        self.txn
            .commit()
            .map_err(|e| KvError::Transaction(format!("commit failed: {}", e)))
    }

    fn rollback(self) -> rusqlite::Result<()> {
        self.txn.rollback()
    }
}

/// Transaction builder
///
/// [`Store::run_transaction`] covers the common case; the builder exists to
/// override the deadline for a single unit of work.
pub struct Transaction<'a, K, V, C = JsonCodec> {
    store: &'a Store<K, V, C>,
    timeout: Duration,
}

impl<'a, K, V, C> Transaction<'a, K, V, C>
where
    K: Serialize + DeserializeOwned + Clone + Send + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + 'static,
    C: Codec,
{
    /// Create a new transaction builder using the store's configured deadline
    pub fn new(store: &'a Store<K, V, C>) -> Self {
        Self {
            store,
            timeout: store.config().txn_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `f` inside one backend transaction
    ///
    /// Commits if `f` succeeds. If `f` fails the transaction is rolled back
    /// and `f`'s error is returned; a failed rollback is reported as
    /// [`KvError::RollbackFailed`] carrying `f`'s error as its source.
    pub fn execute<T, F>(self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TransactionContext<'_, K, V, C>) -> Result<T>,
    {
        let started = Instant::now();
        let conn = self.store.backend().acquire()?;
        let txn = WriteTxn::begin(conn)
            .map_err(|e| KvError::Transaction(format!("begin failed: {}", e)))?;

        let mut ctx = TransactionContext {
            txn,
            table: self.store.table_ref(),
            deadline: started + self.timeout,
            timeout: self.timeout,
            _marker: PhantomData,
        };

        match f(&mut ctx) {
            Ok(value) => {
                let committed = ctx.commit();
                observe::record_transaction(started.elapsed(), committed.is_ok());
                committed.map(|()| value)
            }
            Err(err) => {
                tracing::debug!(table = self.store.table(), error = %err, "Rolling back transaction");
                observe::record_transaction(started.elapsed(), false);
                match ctx.rollback() {
                    Ok(()) => Err(err),
                    Err(e) => Err(KvError::RollbackFailed {
                        rollback: e.to_string(),
                        source: Box::new(err),
                    }),
                }
            }
        }
    }
}
