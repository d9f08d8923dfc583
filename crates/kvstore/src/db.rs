//! Unified database interface
//!
//! Provides a single entry point that owns a backend handle and hands out
//! typed stores over its tables.

use crate::{Backend, BackendConfig, Codec, Result, Store, StoreConfig};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

/// One database file and the stores opened on it
///
/// Cheap to clone; clones share the backend handle and its connection pool.
#[derive(Debug, Clone)]
pub struct KvDb {
    backend: Arc<Backend>,
}

impl KvDb {
    /// Open a dedicated database at `path`
    ///
    /// Independent of the shared handle; parent directories are created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            backend: Backend::open_at(path)?,
        })
    }

    /// Open with custom backend configuration
    pub fn open_with_config(config: BackendConfig) -> Result<Self> {
        Ok(Self {
            backend: Backend::open(config)?,
        })
    }

    /// The process-wide shared database
    ///
    /// Every call returns a handle to the same backend. Its location comes
    /// from `KVSTORE_DIR`, else `~/.cache/kvstore`, else `/tmp/kvstore`, with
    /// a file named after the running program.
    pub fn shared() -> Result<Self> {
        Ok(Self {
            backend: Backend::open_shared()?,
        })
    }

    /// Open (creating if needed) the JSON-encoded store backed by `table`
    pub fn store<K, V>(&self, table: &str) -> Result<Store<K, V>>
    where
        K: Serialize + DeserializeOwned + Clone + Send + 'static,
        V: Serialize + DeserializeOwned + Clone + Send + 'static,
    {
        Store::open(Arc::clone(&self.backend), table)
    }

    /// Open a store with explicit configuration and codec
    pub fn store_with_config<K, V, C>(&self, config: StoreConfig, codec: C) -> Result<Store<K, V, C>>
    where
        K: Serialize + DeserializeOwned + Clone + Send + 'static,
        V: Serialize + DeserializeOwned + Clone + Send + 'static,
        C: Codec,
    {
        Store::with_config(Arc::clone(&self.backend), config, codec)
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    pub fn path(&self) -> &Path {
        self.backend.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JsonCodec;

    #[test]
    fn test_stores_share_one_backend() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = KvDb::open(temp_dir.path().join("db.sqlite")).unwrap();

        let a: Store<String, u32> = db.store("a").unwrap();
        let b: Store<String, u32> = db
            .store_with_config(StoreConfig::new("b").with_watch_capacity(4), JsonCodec)
            .unwrap();

        assert!(Arc::ptr_eq(a.backend(), b.backend()));
        assert_eq!(b.config().watch_capacity, 4);
        assert_eq!(db.path(), temp_dir.path().join("db.sqlite"));
    }
}
