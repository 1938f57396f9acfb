//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Command executor (operations, durations)
//! - Job dispatcher (batch hits, queries, exhausted batches)
//! - Entity cache (live entries)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

// =============================================================================
// Command executor
// =============================================================================

/// Executor operations by submission mode and outcome.
pub static EXECUTOR_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "linkhoard_executor_operations_total",
            "Total operations executed against the file store",
        ),
        &["mode", "result"], // mode: "sync", "async"; result: "ok", "error", "panic"
    )
    .unwrap()
});

/// Time spent executing one operation on the store thread.
pub static EXECUTOR_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "linkhoard_executor_operation_duration_seconds",
            "Duration of file store operations",
        )
        .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["op"],
    )
    .unwrap()
});

// =============================================================================
// Job dispatcher
// =============================================================================

/// Dispatch requests by how they were answered.
pub static JOB_DISPATCH: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("linkhoard_job_dispatch_total", "Total job dispatch requests"),
        &["result"], // "hit", "query", "exhausted", "empty"
    )
    .unwrap()
});

// =============================================================================
// Entity cache
// =============================================================================

/// Live entries held by the entity cache.
pub static CACHE_ENTRIES: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("linkhoard_cache_entries", "Live entities held in the cache"),
        &["kind"], // "file", "package"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(EXECUTOR_OPERATIONS.clone()),
        Box::new(EXECUTOR_DURATION.clone()),
        Box::new(JOB_DISPATCH.clone()),
        Box::new(CACHE_ENTRIES.clone()),
    ]
}

/// Register every core metric in `registry`.
pub fn register(registry: &Registry) -> prometheus::Result<()> {
    for metric in all_metrics() {
        registry.register(metric)?;
    }
    Ok(())
}
