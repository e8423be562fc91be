//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by queueserve and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all queueserve metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of jobs handled, labeled by outcome (completed/rejected).
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Time a worker spent servicing a job, in seconds.
pub static SERVICE_TIME: OnceLock<Histogram> = OnceLock::new();

/// Time a job waited in the queue before a worker picked it up, in seconds.
pub static QUEUE_WAIT: OnceLock<Histogram> = OnceLock::new();

/// Number of jobs resident in the most recently touched queue.
pub static QUEUE_DEPTH: OnceLock<IntGauge> = OnceLock::new();

/// Number of workers currently servicing a job.
pub static ACTIVE_WORKERS: OnceLock<IntGauge> = OnceLock::new();

/// Utilization of the last finished session.
pub static SESSION_UTILIZATION: OnceLock<Gauge> = OnceLock::new();

/// Time-weighted average queue length of the last finished session.
pub static SESSION_AVG_QUEUE_LENGTH: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once is harmless: later calls build a fresh
/// registry but the statics keep the first set of metrics.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Job metrics
    let jobs_total = CounterVec::new(
        Opts::new("queueserve_jobs_total", "Total number of jobs handled"),
        &["outcome"],
    )?;

    let service_time = Histogram::with_opts(
        HistogramOpts::new(
            "queueserve_service_time_seconds",
            "Time a worker spent servicing a job",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )?;

    let queue_wait = Histogram::with_opts(
        HistogramOpts::new(
            "queueserve_queue_wait_seconds",
            "Time a job waited in the queue before service",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )?;

    // Queue and worker metrics
    let queue_depth = IntGauge::new("queueserve_queue_depth", "Number of jobs in queue")?;

    let active_workers = IntGauge::new(
        "queueserve_active_workers",
        "Number of workers currently servicing a job",
    )?;

    // Session metrics
    let session_utilization = Gauge::new(
        "queueserve_session_utilization",
        "Utilization of the last finished session",
    )?;

    let session_avg_queue_length = Gauge::new(
        "queueserve_session_avg_queue_length",
        "Time-weighted average queue length of the last finished session",
    )?;

    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(service_time.clone()))?;
    registry.register(Box::new(queue_wait.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;
    registry.register(Box::new(session_utilization.clone()))?;
    registry.register(Box::new(session_avg_queue_length.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = SERVICE_TIME.set(service_time);
    let _ = QUEUE_WAIT.set(queue_wait);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = ACTIVE_WORKERS.set(active_workers);
    let _ = SESSION_UTILIZATION.set(session_utilization);
    let _ = SESSION_AVG_QUEUE_LENGTH.set(session_avg_queue_length);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, returns a
/// comment line describing the problem.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
