use super::pool::PoolConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a backend handle
///
/// Every field except `path` carries a serde default, so a config file only
/// needs to name the database file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Enable write-ahead journaling so readers and the writer do not block
    /// each other
    /// Default: true
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// SQLite synchronous mode
    #[serde(default)]
    pub synchronous: SynchronousMode,

    /// How long a statement waits on a locked database before failing
    /// Default: 5000ms
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// SQLite cache size per connection (in pages, negative = KB)
    /// Default: -64000 (64MB)
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Connection pool bounds
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// Full fsync (safest, slowest)
    Full,
    /// fsync at critical moments (good balance)
    #[default]
    Normal,
    /// No fsync (fastest, least safe)
    Off,
}

impl SynchronousMode {
    /// Value accepted by `PRAGMA synchronous`
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        }
    }
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_cache_size() -> i32 {
    -64000 // 64MB
}

impl BackendConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: default_wal_mode(),
            synchronous: SynchronousMode::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            cache_size: default_cache_size(),
            pool: PoolConfig::default(),
        }
    }

    pub fn with_synchronous(mut self, synchronous: SynchronousMode) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    pub fn with_cache_size(mut self, cache_size: i32) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Configure connection pooling
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cfg: BackendConfig = serde_json::from_str(r#"{"path": "/tmp/kv.db"}"#).unwrap();

        assert!(cfg.wal_mode);
        assert_eq!(cfg.synchronous, SynchronousMode::Normal);
        assert_eq!(cfg.busy_timeout_ms, 5000);
        assert_eq!(cfg.cache_size, -64000);
        assert_eq!(cfg.pool.max_open, 8);
    }

    #[test]
    fn test_builder_overrides() {
        let cfg = BackendConfig::new("/tmp/kv.db")
            .with_synchronous(SynchronousMode::Full)
            .with_busy_timeout_ms(250)
            .with_pool(PoolConfig::default().with_max_open(2));

        assert_eq!(cfg.synchronous.as_pragma(), "FULL");
        assert_eq!(cfg.busy_timeout_ms, 250);
        assert_eq!(cfg.pool.max_open, 2);
    }
}
