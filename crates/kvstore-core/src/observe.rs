//! Optional metrics instrumentation for kvstore.
//!
//! When the `observe` feature is enabled, store operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must install
//! a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a single-key mutation (counter + latency histogram).
///
/// - `kvstore.mutation.total` – counter with `op` label (`set` / `delete` / `clear`)
/// - `kvstore.mutation.duration_seconds` – histogram, includes watcher delivery
#[inline]
pub fn record_mutation(op: &'static str, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("kvstore.mutation.total", "op" => op).increment(1);
        metrics::histogram!("kvstore.mutation.duration_seconds", "op" => op)
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (op, duration);
    }
}

/// Record how long one watcher delivery took.
///
/// - `kvstore.watch.delivery_wait_seconds` – histogram; large values mean a
///   slow consumer is applying backpressure
#[inline]
pub fn record_delivery_wait(duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::histogram!("kvstore.watch.delivery_wait_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = duration;
    }
}

/// Record a transaction outcome (counter + duration).
///
/// - `kvstore.transaction.total` – counter with `outcome` label (`commit` / `rollback`)
/// - `kvstore.transaction.duration_seconds` – histogram
#[inline]
pub fn record_transaction(duration: std::time::Duration, committed: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if committed { "commit" } else { "rollback" };
        metrics::counter!("kvstore.transaction.total", "outcome" => outcome).increment(1);
        metrics::histogram!("kvstore.transaction.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, committed);
    }
}

/// Record a connection acquisition wait time.
///
/// - `kvstore.pool.acquire_wait_seconds` – histogram
#[inline]
pub fn record_pool_wait(duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::histogram!("kvstore.pool.acquire_wait_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = duration;
    }
}
