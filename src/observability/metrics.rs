//! # Metrics
//!
//! Prometheus metrics for the admin gateway, the lifecycle bridge and the
//! reconcilers.
//!
//! ## Metrics Exposed
//!
//! - `garage_admin_operations_total` - Admin API calls by operation
//! - `garage_admin_operation_errors_total` - Failed admin API calls by operation (404 excluded)
//! - `garage_admin_operation_duration_seconds` - Admin API call latency by operation
//! - `garage_lifecycle_operations_total` - Lifecycle requests by operation (set, get, clear)
//! - `garage_lifecycle_operation_errors_total` - Failed lifecycle requests by operation
//! - `garage_reconciliations_total` - Reconcile steps by resource kind and action
//! - `garage_reconciliation_errors_total` - Failed reconcile steps by resource kind and action
//! - `garage_drift_corrections_total` - Tracked resources found missing, by resource kind

use anyhow::Result;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static ADMIN_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "garage_admin_operations_total",
            "Total number of Garage admin API operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create ADMIN_OPERATIONS_TOTAL metric - this should never happen")
});

static ADMIN_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "garage_admin_operation_errors_total",
            "Total number of failed Garage admin API operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create ADMIN_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static ADMIN_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "garage_admin_operation_duration_seconds",
            "Duration of Garage admin API operations in seconds by operation",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["operation"],
    )
    .expect("Failed to create ADMIN_OPERATION_DURATION metric - this should never happen")
});

static LIFECYCLE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "garage_lifecycle_operations_total",
            "Total number of bucket lifecycle requests by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create LIFECYCLE_OPERATIONS_TOTAL metric - this should never happen")
});

static LIFECYCLE_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "garage_lifecycle_operation_errors_total",
            "Total number of failed bucket lifecycle requests by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create LIFECYCLE_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "garage_reconciliations_total",
            "Total number of reconcile steps by resource kind and action",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "garage_reconciliation_errors_total",
            "Total number of failed reconcile steps by resource kind and action",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static DRIFT_CORRECTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "garage_drift_corrections_total",
            "Total number of tracked resources found missing on read, by resource kind",
        ),
        &["kind"],
    )
    .expect("Failed to create DRIFT_CORRECTIONS_TOTAL metric - this should never happen")
});

/// Register every metric with the crate registry
///
/// Fails if called twice.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(ADMIN_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMIN_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMIN_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(LIFECYCLE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LIFECYCLE_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DRIFT_CORRECTIONS_TOTAL.clone()))?;

    Ok(())
}

/// Text exposition of everything registered
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn record_admin_operation(operation: &str, duration: f64) {
    ADMIN_OPERATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
    ADMIN_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_admin_operation_errors(operation: &str) {
    ADMIN_OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn record_lifecycle_operation(operation: &str) {
    LIFECYCLE_OPERATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn increment_lifecycle_errors(operation: &str) {
    LIFECYCLE_OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn increment_reconciliations(kind: &str, action: &str) {
    RECONCILIATIONS_TOTAL
        .with_label_values(&[kind, action])
        .inc();
}

pub fn increment_reconciliation_errors(kind: &str, action: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[kind, action])
        .inc();
}

pub fn increment_drift_corrections(kind: &str) {
    DRIFT_CORRECTIONS_TOTAL.with_label_values(&[kind]).inc();
}
