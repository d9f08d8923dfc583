use crate::backend::Backend;
use crate::schema;
use crate::table::Table;
use crate::txn::{Transaction, TransactionContext, WriteTxn};
use crossbeam_channel::Receiver;
use kvstore_core::{
    observe, CancelHandle, ChangeEvent, Codec, Direction, JsonCodec, KvError, Matcher, Result,
    StoreConfig, WatcherRegistry,
};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::borrow::Borrow;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

fn storage(e: rusqlite::Error) -> KvError {
    KvError::Storage(e.to_string())
}

/// Typed key/value store over one table
///
/// Keys and values go through the store's [`Codec`]; the encoded key is the
/// table's primary key, so iteration follows encoded-key order.
///
/// `set` and `delete` notify matching watchers before they return. They are
/// serialized per store so that events reach every subscription in the order
/// the mutations were applied.
///
/// # Example
///
/// ```no_run
/// use kvstore_core::Direction;
/// use kvstore_sqlite::{Backend, Store};
/// use std::ops::ControlFlow;
///
/// # fn main() -> kvstore_core::Result<()> {
/// let backend = Backend::open_at("/tmp/example.db")?;
/// let store: Store<String, u32> = Store::open(backend, "ages")?;
///
/// store.set("john".to_string(), 18)?;
/// assert_eq!(store.get("john")?, 18);
///
/// store.for_each(Direction::Forward, |name, age| {
///     println!("{name}: {age}");
///     Ok(ControlFlow::Continue(()))
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct Store<K, V, C = JsonCodec> {
    backend: Arc<Backend>,
    table: Table<C>,
    config: StoreConfig,
    watchers: WatcherRegistry<K, V>,
    write_lock: Mutex<()>,
}

impl<K, V> Store<K, V, JsonCodec>
where
    K: Serialize + DeserializeOwned + Clone + Send + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// Open (creating if needed) the store backed by `table`
    pub fn open(backend: Arc<Backend>, table: &str) -> Result<Self> {
        Self::with_config(backend, StoreConfig::new(table), JsonCodec)
    }
}

impl<K, V, C> Store<K, V, C>
where
    K: Serialize + DeserializeOwned + Clone + Send + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + 'static,
    C: Codec,
{
    /// Open with an explicit configuration and codec
    pub fn with_config(backend: Arc<Backend>, config: StoreConfig, codec: C) -> Result<Self> {
        let table = Table::new(&config.table, codec)?;
        {
            let conn = backend.acquire()?;
            schema::create_table(&conn, &config.table)?;
        }

        tracing::debug!(table = %config.table, codec = table.codec().name(), "Opened store");

        Ok(Self {
            backend,
            table,
            watchers: WatcherRegistry::new(config.watch_capacity),
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Insert or replace a record and notify watchers
    ///
    /// Returns the stored value. Blocks while a matching watcher's queue is
    /// full.
    pub fn set(&self, key: K, value: V) -> Result<V> {
        let started = Instant::now();
        let codec = self.table.codec();
        let encoded_key = codec.encode(&key)?;
        let encoded_value = codec.encode(&value)?;

        let _order = self.write_lock.lock();
        let previous = {
            let txn = WriteTxn::begin(self.backend.acquire()?).map_err(storage)?;
            let previous = self.table.fetch_raw(txn.conn(), &encoded_key)?;
            self.table.put(txn.conn(), &encoded_key, &encoded_value)?;
            txn.commit().map_err(storage)?;
            previous
        };

        if !self.watchers.is_empty() {
            let replaced = previous.is_some();
            let previous = previous.and_then(|text| self.decode_previous(&encoded_key, &text));
            let event = ChangeEvent::set(key, value.clone(), previous).with_replaced(replaced);
            self.watchers.notify(&codec.render_key(&encoded_key), &event);
        }

        observe::record_mutation("set", started.elapsed());
        Ok(value)
    }

    /// Get a value
    ///
    /// Fails with [`KvError::NotFound`] if the key is absent and
    /// [`KvError::Encoding`] if the stored value does not decode as `V`.
    pub fn get<Q>(&self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let encoded = self.table.codec().encode(key)?;
        let conn = self.backend.acquire()?;
        self.table
            .fetch(&conn, &encoded)?
            .ok_or_else(|| self.table.not_found(&encoded))
    }

    /// Get a value, or `default` if the key is absent
    ///
    /// Every other failure is still returned.
    pub fn get_or<Q>(&self, key: &Q, default: V) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        match self.get(key) {
            Err(e) if e.is_not_found() => Ok(default),
            other => other,
        }
    }

    pub fn has<Q>(&self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let encoded = self.table.codec().encode(key)?;
        let conn = self.backend.acquire()?;
        self.table.exists(&conn, &encoded)
    }

    /// Remove a record if present
    ///
    /// Returns whether a record was removed. Watchers see a delete event only
    /// in that case.
    pub fn delete<Q>(&self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Serialize + ToOwned<Owned = K> + ?Sized,
    {
        let started = Instant::now();
        let codec = self.table.codec();
        let encoded_key = codec.encode(key)?;

        let _order = self.write_lock.lock();
        let previous = {
            let txn = WriteTxn::begin(self.backend.acquire()?).map_err(storage)?;
            let previous = self.table.fetch_raw(txn.conn(), &encoded_key)?;
            let removed = self.table.remove(txn.conn(), &encoded_key)?;
            txn.commit().map_err(storage)?;
            if removed == 0 {
                return Ok(false);
            }
            previous
        };

        if !self.watchers.is_empty() {
            let previous = previous.and_then(|text| self.decode_previous(&encoded_key, &text));
            let event = ChangeEvent::delete(key.to_owned(), previous).with_replaced(true);
            self.watchers.notify(&codec.render_key(&encoded_key), &event);
        }

        observe::record_mutation("delete", started.elapsed());
        Ok(true)
    }

    /// Return the existing value, or store and return `value`
    ///
    /// Not atomic against concurrent writers; use a transaction for that.
    pub fn set_if_not_exists(&self, key: K, value: V) -> Result<V> {
        match self.get(&key) {
            Err(e) if e.is_not_found() => self.set(key, value),
            other => other,
        }
    }

    /// Delete every record
    ///
    /// A bulk reset: watchers receive no per-key events.
    pub fn clear(&self) -> Result<()> {
        let started = Instant::now();
        let _order = self.write_lock.lock();
        let conn = self.backend.acquire()?;
        let removed = self.table.truncate(&conn)?;
        tracing::debug!(table = self.table(), removed, "Cleared store");
        observe::record_mutation("clear", started.elapsed());
        Ok(())
    }

    /// Visit records in key order
    ///
    /// Return `ControlFlow::Break` from `f` to stop early; an error from `f`
    /// aborts the traversal and is returned.
    pub fn for_each<F>(&self, direction: Direction, f: F) -> Result<()>
    where
        F: FnMut(K, V) -> Result<ControlFlow<()>>,
    {
        let conn = self.backend.acquire()?;
        self.table.scan(&conn, direction, f)
    }

    /// Visit keys in order without decoding values
    pub fn keys<F>(&self, direction: Direction, f: F) -> Result<()>
    where
        F: FnMut(K) -> Result<ControlFlow<()>>,
    {
        let conn = self.backend.acquire()?;
        self.table.scan_keys(&conn, direction, f)
    }

    /// Collect every record in key order
    pub fn entries(&self, direction: Direction) -> Result<Vec<(K, V)>> {
        let mut entries = Vec::new();
        self.for_each(direction, |k, v| {
            entries.push((k, v));
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(entries)
    }

    pub fn len(&self) -> Result<u64> {
        let conn = self.backend.acquire()?;
        self.table.count(&conn)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Subscribe to changes of keys accepted by `matcher`
    pub fn subscribe(&self, matcher: Matcher) -> (Receiver<ChangeEvent<K, V>>, CancelHandle) {
        self.watchers.subscribe(matcher)
    }

    /// Subscribe to one key, matched on its rendered form
    pub fn watch<Q>(&self, key: &Q) -> Result<(Receiver<ChangeEvent<K, V>>, CancelHandle)>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let codec = self.table.codec();
        let rendered = codec.render_key(&codec.encode(key)?);
        Ok(self.subscribe(Matcher::Key(rendered)))
    }

    /// Subscribe to every key whose rendered form starts with `prefix`
    pub fn watch_prefix(&self, prefix: &str) -> (Receiver<ChangeEvent<K, V>>, CancelHandle) {
        self.subscribe(Matcher::prefix(prefix))
    }

    /// Cancel every subscription on this store
    pub fn stop_all_watchers(&self) {
        self.watchers.stop_all();
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Start a transaction builder
    pub fn transaction(&self) -> Transaction<'_, K, V, C> {
        Transaction::new(self)
    }

    /// Run `f` atomically with the configured deadline
    ///
    /// See [`Transaction::execute`].
    pub fn run_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TransactionContext<'_, K, V, C>) -> Result<T>,
    {
        self.transaction().execute(f)
    }

    pub fn table(&self) -> &str {
        self.table.name()
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn codec(&self) -> &C {
        self.table.codec()
    }

    pub(crate) fn table_ref(&self) -> &Table<C> {
        &self.table
    }

    fn decode_previous(&self, encoded_key: &str, text: &str) -> Option<V> {
        match self.table.codec().decode(text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    table = self.table(),
                    key = %self.table.codec().render_key(encoded_key),
                    error = %e,
                    "Previous value does not decode; event carries replaced without previous"
                );
                None
            }
        }
    }
}

impl<K, V, C> std::fmt::Debug for Store<K, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("table", &self.table.name())
            .field("backend", &self.backend.path())
            .field("watchers", &self.watchers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
    }

    fn open_store<V>(table: &str) -> (Store<String, V>, TempDir)
    where
        V: Serialize + DeserializeOwned + Clone + Send + 'static,
    {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = Backend::open_at(temp_dir.path().join("store.db")).unwrap();
        (Store::open(backend, table).unwrap(), temp_dir)
    }

    #[test]
    fn test_struct_round_trip() {
        let (store, _temp) = open_store::<User>("users");
        let john = User {
            name: "john".into(),
            age: 18,
        };

        assert_eq!(store.set("john".into(), john.clone()).unwrap(), john);
        assert_eq!(store.get("john").unwrap(), john);
    }

    #[test]
    fn test_missing_key() {
        let (store, _temp) = open_store::<u32>("t");

        assert!(store.get("nope").unwrap_err().is_not_found());
        assert_eq!(store.get_or("nope", 3).unwrap(), 3);
        assert!(!store.has("nope").unwrap());
        assert!(!store.delete("nope").unwrap());
    }

    #[test]
    fn test_get_or_surfaces_decode_errors() {
        let (store, _temp) = open_store::<String>("t");
        store.set("k".into(), "text".into()).unwrap();

        let numbers: Store<String, u32> = Store::open(Arc::clone(store.backend()), "t").unwrap();
        assert!(matches!(numbers.get_or("k", 0), Err(KvError::Encoding(_))));
    }

    #[test]
    fn test_set_if_not_exists() {
        let (store, _temp) = open_store::<u32>("t");
        assert_eq!(store.set_if_not_exists("k".into(), 1).unwrap(), 1);
        assert_eq!(store.set_if_not_exists("k".into(), 2).unwrap(), 1);
        assert_eq!(store.get("k").unwrap(), 1);
    }

    #[test]
    fn test_invalid_table_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = Backend::open_at(temp_dir.path().join("store.db")).unwrap();
        let err = Store::<String, u32>::open(backend, "bad name").unwrap_err();
        assert!(matches!(err, KvError::Config(_)));
    }

    #[test]
    fn test_events_carry_previous_value() {
        let (store, _temp) = open_store::<u32>("t");
        let (rx, _cancel) = store.watch("k").unwrap();

        store.set("k".into(), 1).unwrap();
        store.set("k".into(), 2).unwrap();
        store.delete("k").unwrap();
        store.delete("k").unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ChangeEvent::set("k".to_string(), 1, None),
                ChangeEvent::set("k".to_string(), 2, Some(1)),
                ChangeEvent::delete("k".to_string(), Some(2)),
            ]
        );
    }

    #[test]
    fn test_undecodable_previous_is_flagged() {
        let (store, _temp) = open_store::<u32>("t");
        let text: Store<String, String> = Store::open(Arc::clone(store.backend()), "t").unwrap();
        text.set("k".into(), "not a number".into()).unwrap();

        let (rx, _cancel) = store.watch("k").unwrap();
        store.set("k".into(), 1).unwrap();
        store.set("fresh".into(), 2).unwrap();
        store.delete("k").unwrap();

        let overwritten = rx.try_recv().unwrap();
        assert_eq!(overwritten.previous, None);
        assert!(overwritten.replaced);

        let deleted = rx.try_recv().unwrap();
        assert_eq!(deleted.previous, Some(1));
        assert!(deleted.replaced);

        // A genuinely new key is not flagged
        let (fresh_rx, _fresh) = store.watch("other").unwrap();
        store.set("other".into(), 3).unwrap();
        assert!(!fresh_rx.try_recv().unwrap().replaced);
    }

    #[test]
    fn test_clear_emits_nothing() {
        let (store, _temp) = open_store::<u32>("t");
        store.set("a".into(), 1).unwrap();
        let (rx, _cancel) = store.watch_prefix("");

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_drop_closes_watchers() {
        let (store, _temp) = open_store::<u32>("t");
        let (rx, cancel) = store.watch_prefix("");
        drop(store);

        assert!(rx.recv().is_err());
        cancel.cancel();
    }
}
