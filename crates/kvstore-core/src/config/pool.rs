use crate::error::{KvError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the backend connection pool
///
/// Every logical store sharing a backend handle draws connections from the
/// same pool, so `max_open` bounds the number of physical SQLite connections
/// in use at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of open connections (default: 8)
    #[serde(default = "default_max_open")]
    pub max_open: usize,

    /// Idle connections kept open and ready (default: 1)
    ///
    /// Opened when the pool is built. Must not exceed `max_open`.
    #[serde(default = "default_min_idle")]
    pub min_idle: usize,

    /// Close idle connections above `min_idle` after this many seconds
    /// (default: 600, 0 = never)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Maximum lifetime of a connection in seconds (default: 3600, 0 = unbounded)
    ///
    /// Older connections are closed instead of being reused.
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    /// Timeout in milliseconds when acquiring a pooled connection (default: 5000)
    ///
    /// If no connection is available within this time, an error is returned.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: default_max_open(),
            min_idle: default_min_idle(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            acquire_timeout_ms: default_acquire_timeout(),
        }
    }
}

impl PoolConfig {
    pub fn with_max_open(mut self, max_open: usize) -> Self {
        self.max_open = max_open;
        self
    }

    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    pub fn with_max_lifetime_secs(mut self, secs: u64) -> Self {
        self.max_lifetime_secs = secs;
        self
    }

    /// Set the acquire timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        (self.max_lifetime_secs > 0).then(|| Duration::from_secs(self.max_lifetime_secs))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Reject bounds the pool cannot be built with
    pub fn validate(&self) -> Result<()> {
        if self.max_open == 0 {
            return Err(KvError::Config("pool.max_open must be at least 1".into()));
        }
        if self.min_idle > self.max_open {
            return Err(KvError::Config(format!(
                "pool.min_idle ({}) exceeds pool.max_open ({})",
                self.min_idle, self.max_open
            )));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(KvError::Config(
                "pool.acquire_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_open() -> usize {
    8
}

fn default_min_idle() -> usize {
    1
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    3600
}

fn default_acquire_timeout() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables_lifetimes() {
        let config = PoolConfig::default()
            .with_max_lifetime_secs(0)
            .with_idle_timeout_secs(0);
        assert_eq!(config.max_lifetime(), None);
        assert_eq!(config.idle_timeout(), None);
        assert_eq!(
            PoolConfig::default().max_lifetime(),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_validate() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(PoolConfig::default().with_max_open(0).validate().is_err());
        assert!(PoolConfig::default()
            .with_max_open(2)
            .with_min_idle(3)
            .validate()
            .is_err());
        assert!(PoolConfig::default().with_timeout(0).validate().is_err());
    }
}
