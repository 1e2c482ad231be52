// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Lightspeed operator.
//!
//! All metric names carry the prefix `ols_openshift_io_` (prometheus-safe
//! version of "ols.openshift.io").
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - reconcile passes and their outcomes
//! - **Resource Lifecycle Metrics** - managed objects created, updated and deleted
//! - **Task Metrics** - failed reconcile tasks and forced rollouts
//! - **Leader Election Metrics** - leadership state of this replica
//!
//! # Example
//!
//! ```rust,no_run
//! use lightspeed_operator::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("OLSConfig", std::time::Duration::from_secs(1));
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all operator metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "ols_openshift_io";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by resource type and status
///
/// Labels:
/// - `resource_type`: Kind of resource (always `OLSConfig` today)
/// - `status`: Outcome (`success`, `error`, `requeue`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by resource type and status",
    );
    let counter = CounterVec::new(opts, &["resource_type", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Resource Lifecycle Metrics
// ============================================================================

/// Total number of managed resources created
///
/// Labels:
/// - `resource_type`: Kind of resource created (e.g., `Deployment`, `Secret`)
pub static RESOURCES_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_created_total"),
        "Total number of resources created by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of managed resources updated
pub static RESOURCES_UPDATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_updated_total"),
        "Total number of resources updated by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of managed resources deleted
pub static RESOURCES_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_deleted_total"),
        "Total number of resources deleted by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Task Metrics
// ============================================================================

/// Total number of failed reconcile tasks
///
/// Labels:
/// - `subsystem`: `postgres`, `appserver` or `console`
/// - `task`: Task name as logged (e.g., `reconcile Postgres Secret`)
pub static TASK_FAILURES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_task_failures_total"),
        "Total number of failed reconcile tasks by subsystem and task",
    );
    let counter = CounterVec::new(opts, &["subsystem", "task"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of forced rolling restarts
///
/// Labels:
/// - `deployment`: Name of the restarted Deployment
pub static DEPLOYMENT_RESTARTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_deployment_restarts_total"),
        "Total number of rolling restarts forced through the pod template",
    );
    let counter = CounterVec::new(opts, &["deployment"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Leader Election Metrics
// ============================================================================

/// Current leader election status
///
/// Value: 1 if leader, 0 if follower
pub static LEADER_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_status"),
        "Current leader election status (1 = leader, 0 = follower)",
    );
    let gauge = GaugeVec::new(opts, &["pod_name"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a reconciliation that finished but asked for an early requeue
pub fn record_reconciliation_requeue(resource_type: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
}

/// Record resource creation
pub fn record_resource_created(resource_type: &str) {
    RESOURCES_CREATED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Record resource update
pub fn record_resource_updated(resource_type: &str) {
    RESOURCES_UPDATED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Record resource deletion
pub fn record_resource_deleted(resource_type: &str) {
    RESOURCES_DELETED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Record a failed reconcile task
pub fn record_task_failure(subsystem: &str, task: &str) {
    TASK_FAILURES_TOTAL
        .with_label_values(&[subsystem, task])
        .inc();
}

/// Record a forced rolling restart of a Deployment
pub fn record_deployment_restart(deployment: &str) {
    DEPLOYMENT_RESTARTS_TOTAL
        .with_label_values(&[deployment])
        .inc();
}

/// Record leader election acquired
pub fn record_leader_elected(pod_name: &str) {
    LEADER_STATUS.with_label_values(&[pod_name]).set(1.0);
}

/// Record leader election lost
pub fn record_leader_lost(pod_name: &str) {
    LEADER_STATUS.with_label_values(&[pod_name]).set(0.0);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_success() {
        let resource_type = "TestResource";
        record_reconciliation_success(resource_type, Duration::from_millis(500));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[resource_type, "success"]);
        assert!(counter.get() > 0.0);

        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&[resource_type]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_task_failure() {
        record_task_failure("postgres", "reconcile Postgres Secret");

        let counter =
            TASK_FAILURES_TOTAL.with_label_values(&["postgres", "reconcile Postgres Secret"]);
        assert!(counter.get() >= 1.0);
    }

    #[test]
    fn test_record_leader_transitions() {
        record_leader_elected("pod-under-test");
        assert!((LEADER_STATUS.with_label_values(&["pod-under-test"]).get() - 1.0).abs() < f64::EPSILON);

        record_leader_lost("pod-under-test");
        assert!(LEADER_STATUS.with_label_values(&["pod-under-test"]).get().abs() < f64::EPSILON);
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation_success("GatherTest", Duration::from_millis(100));
        record_deployment_restart("gather-test-deployment");

        let metrics_text = gather_metrics().unwrap();
        assert!(metrics_text.contains("ols_openshift_io"));
        assert!(metrics_text.contains("reconciliations_total"));
        assert!(metrics_text.contains("deployment_restarts_total"));
    }
}
