//! Prometheus metrics for clinic billing operations.
//!
//! Billing counters live in the default prometheus registry. HTTP request
//! metrics from the shared middleware go through the `metrics` facade and
//! its Prometheus recorder. `/metrics` serves both.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram_vec, register_int_counter_vec,
    CounterVec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "clinic_billing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Bills created, by initial payment status
pub static BILLS_CREATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Bill revisions and archivals, by action
pub static BILL_UPDATES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Payment ledger entries, by method
pub static PAYMENTS_RECORDED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Payment amount collected, by method
pub static PAYMENT_AMOUNT_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Analytics adjustments that failed after the bill committed
pub static ANALYTICS_FAILURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Recorder behind the HTTP request metrics.
pub static HTTP_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    BILLS_CREATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "clinic_billing_bills_created_total",
                "Total bills created by initial payment status"
            ),
            &["payment_status"]
        )
        .expect("Failed to register BILLS_CREATED_TOTAL")
    });

    BILL_UPDATES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "clinic_billing_bill_updates_total",
                "Total bill mutations by action"
            ),
            &["action"]
        )
        .expect("Failed to register BILL_UPDATES_TOTAL")
    });

    PAYMENTS_RECORDED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "clinic_billing_payments_recorded_total",
                "Total payment ledger entries by method"
            ),
            &["method"]
        )
        .expect("Failed to register PAYMENTS_RECORDED_TOTAL")
    });

    // Payment amount counter for financial tracking
    PAYMENT_AMOUNT_TOTAL.get_or_init(|| {
        register_counter_vec!(
            opts!(
                "clinic_billing_payment_amount_total",
                "Total payment amount by method"
            ),
            &["method"]
        )
        .expect("Failed to register PAYMENT_AMOUNT_TOTAL")
    });

    ANALYTICS_FAILURES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "clinic_billing_analytics_failures_total",
                "Analytics adjustments that failed after the bill committed"
            ),
            &["operation"]
        )
        .expect("Failed to register ANALYTICS_FAILURES_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "clinic_billing_errors_total",
                "Total errors by type for alerting"
            ),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    HTTP_METRICS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install HTTP metrics recorder")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    let mut body = String::from_utf8(buffer).unwrap_or_default();
    if let Some(handle) = HTTP_METRICS_HANDLE.get() {
        body.push_str(&handle.render());
    }
    body
}

pub fn record_bill_created(payment_status: &str) {
    if let Some(counter) = BILLS_CREATED_TOTAL.get() {
        counter.with_label_values(&[payment_status]).inc();
    }
}

pub fn record_bill_update(action: &str) {
    if let Some(counter) = BILL_UPDATES_TOTAL.get() {
        counter.with_label_values(&[action]).inc();
    }
}

/// Record a ledger entry and its amount.
pub fn record_payment(method: &str, amount: f64) {
    if let Some(counter) = PAYMENTS_RECORDED_TOTAL.get() {
        counter.with_label_values(&[method]).inc();
    }
    if let Some(counter) = PAYMENT_AMOUNT_TOTAL.get() {
        counter.with_label_values(&[method]).inc_by(amount.abs());
    }
}

pub fn record_analytics_failure(operation: &str) {
    if let Some(counter) = ANALYTICS_FAILURES_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
