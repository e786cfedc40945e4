//! Prometheus metrics for the torrent index.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

/// Ingestion calls by outcome.
pub static INGEST_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("hashdex_ingest_total", "Total torrent ingestion calls"),
        // "added", "already_exists", "invalid_name", "invalid_path", "zero_size",
        // "size_overflow", "error"
        &["outcome"],
    )
    .unwrap()
});

/// Duration of index operations in seconds.
pub static QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "hashdex_query_duration_seconds",
            "Duration of torrent index operations",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ]),
        &["operation"],
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(INGEST_TOTAL.clone()),
        Box::new(QUERY_DURATION.clone()),
    ]
}
