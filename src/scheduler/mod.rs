//! Bounded job queue, scheduling policies and worker pool.
//!
//! This module provides the in-process scheduling core used for each client
//! connection:
//!
//! - **BoundedJobQueue**: Fixed-capacity ring buffer with FIFO or SJN placement
//! - **WorkerPool**: Pool of OS threads that drain the queue concurrently
//! - **UtilizationTracker**: Queue-length snapshots and busy intervals
//! - **Job**: Job definitions and the processing lifecycle
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  Connection  │
//!                      │   handler    │
//!                      └──────┬───────┘
//!                             │ enqueue (never blocks, may reject)
//!                      ┌──────▼───────┐        ┌─────────────┐
//!                      │   Bounded    │───────▶│ Utilization │
//!                      │  job queue   │snapshot│   tracker   │
//!                      └──────┬───────┘        └──────▲──────┘
//!                             │ dequeue (blocks)      │ busy intervals
//!         ┌───────────────────┼───────────────────┐   │
//!         ▼                   ▼                   ▼   │
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 0│         │ Worker 1│         │ Worker N│
//!    └─────────┘         └─────────┘         └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use queueserve::scheduler::{
//!     BoundedJobQueue, Job, QueuedJob, ResultSink, SchedulingPolicy, Timestamp,
//!     UtilizationTracker, WorkerPool,
//! };
//!
//! let tracker = Arc::new(UtilizationTracker::new(2));
//! tracker.record_snapshot(Timestamp::now(), 0);
//! let queue = Arc::new(
//!     BoundedJobQueue::with_tracker(16, SchedulingPolicy::Sjn, Arc::clone(&tracker)).unwrap(),
//! );
//!
//! let sink: Arc<dyn ResultSink> = Arc::new(|worker_id: usize, job: QueuedJob| {
//!     println!("worker {} finished job {}", worker_id, job.id());
//! });
//! let mut pool = WorkerPool::start(2, Arc::clone(&queue), sink).unwrap();
//!
//! let job = Job::received_now(1, Timestamp::now(), Duration::from_millis(5));
//! assert!(queue.enqueue(job).is_accepted());
//!
//! // Graceful shutdown
//! pool.stop().unwrap();
//! let summary = tracker.finalize(Timestamp::now());
//! assert!(summary.utilization <= 1.0);
//! ```

pub mod job;
pub mod queue;
pub mod time;
pub mod tracker;
pub mod worker_pool;

// Re-export main types for convenience
pub use job::{Job, QueuedJob, SchedulingPolicy};
pub use queue::{Admission, BoundedJobQueue, Dequeued, QueueError};
pub use time::{busywait, Timestamp};
pub use tracker::{Snapshot, UtilizationSummary, UtilizationTracker};
pub use worker_pool::{PoolError, PoolStats, ResultSink, WorkerPool};
