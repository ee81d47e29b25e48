//! Prometheus metrics for franchise-ledger.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Movement counter by ledger and outcome.
pub static MOVEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_movements_total",
        "Total number of movements applied",
        &["ledger", "status"]  // bank_account/petty_cash/inventory, ok/error
    )
    .expect("Failed to register movements_total")
});

/// Statements built by ledger.
pub static STATEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_statements_total",
        "Total number of statements built",
        &["ledger"]
    )
    .expect("Failed to register statements_total")
});

/// Reconciliation runs by outcome.
pub static RECONCILIATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_reconciliations_total",
        "Total number of balance reconciliations",
        &["outcome"]  // consistent, drift, repaired
    )
    .expect("Failed to register reconciliations_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&MOVEMENTS_TOTAL);
    Lazy::force(&STATEMENTS_TOTAL);
    Lazy::force(&RECONCILIATIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

pub fn record_movement(ledger: &str, ok: bool) {
    MOVEMENTS_TOTAL
        .with_label_values(&[ledger, if ok { "ok" } else { "error" }])
        .inc();
}

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
