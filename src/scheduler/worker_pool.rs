//! Fixed pool of worker threads draining a bounded queue.
//!
//! Each worker runs on its own OS thread and repeatedly takes one job from
//! the shared [`BoundedJobQueue`], busy-waits for the job's requested
//! duration, stamps its start and completion times, and hands it to a
//! [`ResultSink`].
//!
//! # Features
//!
//! - Configurable number of workers
//! - Graceful shutdown: one release token per worker, then join
//! - In-flight jobs always run to completion
//! - Pool statistics tracking

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

use super::job::QueuedJob;
use super::queue::{BoundedJobQueue, Dequeued};
use super::time::{busywait, Timestamp};
use super::tracker::UtilizationTracker;
use crate::metrics::MetricsCollector;

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool needs at least one worker.
    #[error("Worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    /// The OS refused to create a worker thread.
    #[error("Failed to spawn worker {worker_id}: {source}")]
    SpawnFailed {
        worker_id: usize,
        #[source]
        source: io::Error,
    },

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// A worker thread panicked before it could be joined.
    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Receives every completed job.
///
/// Called once per job, on the worker thread that processed it.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, worker_id: usize, job: QueuedJob);
}

impl<F> ResultSink for F
where
    F: Fn(usize, QueuedJob) + Send + Sync,
{
    fn deliver(&self, worker_id: usize, job: QueuedJob) {
        self(worker_id, job)
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently processing jobs.
    pub active_workers: usize,
    /// Total number of jobs processed to completion.
    pub jobs_completed: u64,
    /// Processing time summed over all workers.
    pub total_busy: Duration,
}

impl PoolStats {
    /// Returns the mean processing time per completed job.
    pub fn average_service_time(&self) -> Duration {
        if self.jobs_completed == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total_busy.as_nanos() / self.jobs_completed as u128) as u64)
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    total_busy_nanos: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            total_busy_nanos: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, busy: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_busy_nanos
            .fetch_add(busy.as_nanos() as u64, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        PoolStats {
            num_workers,
            active_workers: self.active_workers.load(Ordering::SeqCst) as usize,
            jobs_completed: self.jobs_completed.load(Ordering::SeqCst),
            total_busy: Duration::from_nanos(self.total_busy_nanos.load(Ordering::SeqCst)),
        }
    }
}

/// Worker pool that manages multiple workers processing jobs from a queue.
pub struct WorkerPool {
    num_workers: usize,
    queue: Arc<BoundedJobQueue>,
    terminate: Arc<AtomicBool>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
}

impl WorkerPool {
    /// Spawns `num_workers` worker threads and returns immediately.
    ///
    /// Workers record busy intervals into the queue's tracker and hand
    /// completed jobs to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidWorkerCount` for zero workers and
    /// `PoolError::SpawnFailed` if a thread cannot be created; workers
    /// already spawned are stopped before the error is returned.
    pub fn start(
        num_workers: usize,
        queue: Arc<BoundedJobQueue>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, PoolError> {
        if num_workers == 0 {
            return Err(PoolError::InvalidWorkerCount(num_workers));
        }

        let mut pool = Self {
            num_workers,
            queue: Arc::clone(&queue),
            terminate: Arc::new(AtomicBool::new(false)),
            worker_handles: Vec::with_capacity(num_workers),
            stats: Arc::new(SharedPoolStats::new()),
        };

        for worker_id in 0..num_workers {
            let worker = Worker::new(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&sink),
                Arc::clone(&pool.terminate),
                Arc::clone(&pool.stats),
            );

            let spawned = thread::Builder::new()
                .name(format!("worker-{}", worker_id))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => pool.worker_handles.push(handle),
                Err(source) => {
                    error!(worker_id, error = %source, "Failed to spawn worker");
                    // Unwind the workers that did start; their exit status
                    // does not change the error we report.
                    let _ = pool.stop();
                    return Err(PoolError::SpawnFailed { worker_id, source });
                }
            }
        }

        info!(
            num_workers,
            capacity = queue.capacity(),
            policy = %queue.policy(),
            "Worker pool started"
        );

        Ok(pool)
    }

    /// Stops every worker and waits for all of them to exit.
    ///
    /// Idle workers are released from `dequeue`; a worker in the middle of
    /// a job finishes it first. Jobs still queued are left unprocessed.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NotRunning` if the pool was already stopped and
    /// `PoolError::WorkerPanicked` if any worker thread panicked.
    pub fn stop(&mut self) -> Result<(), PoolError> {
        if self.worker_handles.is_empty() {
            return Err(PoolError::NotRunning);
        }

        info!(
            num_workers = self.worker_handles.len(),
            "Initiating worker pool shutdown"
        );

        self.terminate.store(true, Ordering::SeqCst);
        self.queue.release(self.worker_handles.len());

        let mut panicked = None;
        for (worker_id, handle) in self.worker_handles.drain(..).enumerate() {
            if handle.join().is_err() {
                error!(worker_id, "Worker thread panicked during shutdown");
                panicked.get_or_insert(worker_id);
            }
        }

        let abandoned = self.queue.len();
        info!(abandoned, "Worker pool shutdown complete");

        match panicked {
            Some(worker_id) => Err(PoolError::WorkerPanicked(worker_id)),
            None => Ok(()),
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.num_workers)
    }

    /// Returns whether the pool has running workers.
    pub fn is_running(&self) -> bool {
        !self.worker_handles.is_empty()
    }

    /// Returns the number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                error!(error = %e, "Worker pool shutdown on drop failed");
            }
        }
    }
}

/// A single worker that processes jobs from the queue.
struct Worker {
    /// Position of this worker in the pool.
    id: usize,
    /// Reference to the job queue.
    queue: Arc<BoundedJobQueue>,
    /// Busy intervals are recorded here.
    tracker: Arc<UtilizationTracker>,
    /// Destination of completed jobs.
    sink: Arc<dyn ResultSink>,
    /// Set once by `WorkerPool::stop`.
    terminate: Arc<AtomicBool>,
    /// Shared statistics.
    stats: Arc<SharedPoolStats>,
    metrics: MetricsCollector,
}

impl Worker {
    /// Creates a new worker.
    fn new(
        id: usize,
        queue: Arc<BoundedJobQueue>,
        sink: Arc<dyn ResultSink>,
        terminate: Arc<AtomicBool>,
        stats: Arc<SharedPoolStats>,
    ) -> Self {
        let tracker = Arc::clone(queue.tracker());
        Self {
            id,
            queue,
            tracker,
            sink,
            terminate,
            stats,
            metrics: MetricsCollector::new(),
        }
    }

    /// Main worker loop.
    ///
    /// Takes one job at a time until a release token arrives with the
    /// termination flag set. A job already removed from the queue is always
    /// processed.
    fn run(self) {
        info!(worker_id = self.id, "Worker started");

        loop {
            match self.queue.dequeue() {
                Dequeued::Job(job) => self.process_job(job),
                Dequeued::Released if self.terminate.load(Ordering::SeqCst) => break,
                Dequeued::Released => {
                    debug!(worker_id = self.id, "Release token without shutdown");
                }
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    /// Processes a single job.
    fn process_job(&self, mut job: QueuedJob) {
        let start = Timestamp::now();
        job.mark_started(start);

        self.stats.increment_active();
        self.metrics.worker_busy();

        debug!(
            worker_id = self.id,
            job_id = job.id(),
            requested_ms = job.requested_duration().as_millis() as u64,
            "Processing job"
        );

        busywait(job.requested_duration());

        let end = Timestamp::now();
        job.mark_completed(end);
        let busy = end - start;

        self.stats.decrement_active();
        self.stats.record_completion(busy);
        self.tracker.record_busy_interval(start, end);
        self.metrics.worker_idle();
        self.metrics
            .record_completion(busy, job.queue_wait().unwrap_or_default());

        debug!(
            worker_id = self.id,
            job_id = job.id(),
            busy_ms = busy.as_millis() as u64,
            "Job completed"
        );

        self.sink.deliver(self.id, job);
    }
}
