//! Metrics module for Prometheus-based monitoring.
//!
//! Tracks queue depth, busy workers, job outcomes, service and wait time
//! distributions, and the summary figures of the last finished session.
//!
//! # Example
//!
//! ```
//! use queueserve::metrics::{export_metrics, init_metrics, MetricsCollector};
//!
//! init_metrics().unwrap();
//! MetricsCollector::new().record_rejection();
//!
//! let metrics_text = export_metrics();
//! assert!(metrics_text.contains("queueserve_jobs_total"));
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_WORKERS, JOBS_TOTAL, QUEUE_DEPTH, QUEUE_WAIT, REGISTRY, SERVICE_TIME,
    SESSION_AVG_QUEUE_LENGTH, SESSION_UTILIZATION,
};
