//! High-level interface for recording queueserve metrics.
//!
//! The `MetricsCollector` wraps the raw Prometheus metrics. Every method is a
//! no-op until [`init_metrics`](super::init_metrics) has been called, so the
//! scheduler can record unconditionally.

use std::time::Duration;

use super::prometheus::{
    ACTIVE_WORKERS, JOBS_TOTAL, QUEUE_DEPTH, QUEUE_WAIT, SERVICE_TIME, SESSION_AVG_QUEUE_LENGTH,
    SESSION_UTILIZATION,
};
use crate::scheduler::UtilizationSummary;

/// Metrics collector for recording scheduler and session metrics.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use queueserve::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().unwrap();
/// let collector = MetricsCollector::new();
///
/// collector.set_queue_depth(3);
/// collector.record_completion(Duration::from_millis(20), Duration::from_millis(5));
/// collector.record_rejection();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Update the queue depth gauge.
    pub fn set_queue_depth(&self, depth: usize) {
        if let Some(queue_depth) = QUEUE_DEPTH.get() {
            queue_depth.set(depth as i64);
        }
    }

    /// Mark a worker as having started a job.
    pub fn worker_busy(&self) {
        if let Some(active) = ACTIVE_WORKERS.get() {
            active.inc();
        }
    }

    /// Mark a worker as having finished a job.
    pub fn worker_idle(&self) {
        if let Some(active) = ACTIVE_WORKERS.get() {
            active.dec();
        }
    }

    /// Record a completed job.
    ///
    /// # Arguments
    ///
    /// * `service` - Time between start and completion
    /// * `wait` - Time between receipt and start
    pub fn record_completion(&self, service: Duration, wait: Duration) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total.with_label_values(&["completed"]).inc();
        }

        if let Some(service_time) = SERVICE_TIME.get() {
            service_time.observe(service.as_secs_f64());
        }

        if let Some(queue_wait) = QUEUE_WAIT.get() {
            queue_wait.observe(wait.as_secs_f64());
        }

        tracing::trace!(
            service_secs = service.as_secs_f64(),
            wait_secs = wait.as_secs_f64(),
            "Recorded completion metric"
        );
    }

    /// Record a job rejected because the queue was full.
    pub fn record_rejection(&self) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total.with_label_values(&["rejected"]).inc();
        }

        tracing::trace!("Recorded rejection metric");
    }

    /// Publish the figures of a finished session.
    pub fn record_session(&self, summary: &UtilizationSummary) {
        if let Some(utilization) = SESSION_UTILIZATION.get() {
            utilization.set(summary.utilization);
        }

        if let Some(avg) = SESSION_AVG_QUEUE_LENGTH.get() {
            avg.set(summary.avg_queue_length);
        }

        tracing::trace!(
            utilization = summary.utilization,
            avg_queue_length = summary.avg_queue_length,
            "Recorded session metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::init_metrics;

    fn ensure_metrics_init() {
        let _ = init_metrics();
    }

    #[test]
    fn test_metrics_collector_new() {
        let collector = MetricsCollector::new();
        // Without init this must not panic
        collector.set_queue_depth(1);
    }

    #[test]
    fn test_record_completion() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();
        let before = JOBS_TOTAL
            .get()
            .map(|c| c.with_label_values(&["completed"]).get())
            .unwrap_or_default();

        collector.record_completion(Duration::from_millis(10), Duration::from_millis(2));

        let after = JOBS_TOTAL
            .get()
            .map(|c| c.with_label_values(&["completed"]).get())
            .unwrap_or_default();
        assert!(after >= before + 1.0);
    }

    #[test]
    fn test_record_rejection() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();
        collector.record_rejection();

        let rejected = JOBS_TOTAL
            .get()
            .map(|c| c.with_label_values(&["rejected"]).get())
            .unwrap_or_default();
        assert!(rejected >= 1.0);
    }

    #[test]
    fn test_record_session() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();
        let summary = UtilizationSummary {
            avg_queue_length: 1.5,
            utilization: 0.75,
            ..Default::default()
        };
        collector.record_session(&summary);

        let export = crate::metrics::export_metrics();
        assert!(export.contains("queueserve_session_avg_queue_length"));
    }
}
