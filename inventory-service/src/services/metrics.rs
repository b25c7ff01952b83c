//! Prometheus metrics for inventory-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Single movements by operation (create, update, delete) and status.
pub static MOVEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_movements_total",
        "Total number of single movement operations",
        &["operation", "status"]
    )
    .expect("Failed to register movements_total")
});

/// Bulk requests by outcome (applied, rejected, error).
pub static BULK_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_bulk_requests_total",
        "Total number of bulk movement requests",
        &["status"]
    )
    .expect("Failed to register bulk_requests_total")
});

/// Bulk lines by outcome.
pub static BULK_LINES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_bulk_lines_total",
        "Total number of bulk movement lines",
        &["status"]
    )
    .expect("Failed to register bulk_lines_total")
});

/// Recount lines by outcome (applied, or the failure reason).
pub static RECOUNT_LINES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_recount_lines_total",
        "Total number of recount lines",
        &["status"]
    )
    .expect("Failed to register recount_lines_total")
});

/// Monthly counter resets.
pub static COUNTER_RESETS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_counter_resets_total",
        "Total number of monthly counter resets",
        &["status"]
    )
    .expect("Failed to register counter_resets_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_errors_total",
        "Total number of errors by type",
        &["error_type"]  // insufficient_stock, db_error, etc.
    )
    .expect("Failed to register errors_total")
});

/// Failed post-commit notifications.
pub static NOTIFICATION_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_notification_failures_total",
        "Total number of bulk completion events that could not be delivered",
        &["notifier"]
    )
    .expect("Failed to register notification_failures_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "inventory_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&MOVEMENTS_TOTAL);
    Lazy::force(&BULK_REQUESTS_TOTAL);
    Lazy::force(&BULK_LINES_TOTAL);
    Lazy::force(&RECOUNT_LINES_TOTAL);
    Lazy::force(&COUNTER_RESETS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&NOTIFICATION_FAILURES_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Record a single movement outcome.
pub fn record_movement(operation: &str, ok: bool) {
    MOVEMENTS_TOTAL
        .with_label_values(&[operation, if ok { "ok" } else { "error" }])
        .inc();
}

/// Record an error by type.
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
