use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one logical store (table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Table backing the store. Letters, digits and `_`, not starting with a digit.
    pub table: String,

    /// Capacity of each subscription's event queue
    /// A full queue blocks the mutating caller until the subscriber drains it
    /// or cancels.
    /// Default: 100
    #[serde(default = "default_watch_capacity")]
    pub watch_capacity: usize,

    /// Deadline for a transaction, measured from `begin`
    /// Default: 30000ms
    #[serde(default = "default_txn_timeout_ms")]
    pub txn_timeout_ms: u64,
}

fn default_watch_capacity() -> usize {
    100
}

fn default_txn_timeout_ms() -> u64 {
    30_000
}

impl StoreConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            watch_capacity: default_watch_capacity(),
            txn_timeout_ms: default_txn_timeout_ms(),
        }
    }

    pub fn with_watch_capacity(mut self, capacity: usize) -> Self {
        self.watch_capacity = capacity;
        self
    }

    pub fn with_txn_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.txn_timeout_ms = timeout_ms;
        self
    }

    pub fn txn_timeout(&self) -> Duration {
        Duration::from_millis(self.txn_timeout_ms)
    }
}
