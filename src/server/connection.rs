//! Lifetime of a single client connection.
//!
//! Every connection gets its own queue, tracker and worker pool. Requests
//! are read on the async side and offered to the queue without blocking;
//! workers report completions through an unbounded channel to a writer
//! task that owns the outbound half of the stream.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::protocol::{self, ResponseRecord};
use super::report::Reporter;
use crate::config::ServerConfig;
use crate::metrics::MetricsCollector;
use crate::scheduler::{
    Admission, BoundedJobQueue, Job, PoolError, QueueError, QueuedJob, ResultSink,
    SchedulingPolicy, Timestamp, UtilizationSummary, UtilizationTracker, WorkerPool,
};

/// Errors that end a session before any request is served.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Queue setup failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Worker pool failed: {0}")]
    Pool(#[from] PoolError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// What happened during one connection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    /// Requests admitted to the queue.
    pub accepted: u64,
    /// Requests turned away because the queue was full.
    pub rejected: u64,
    /// Admitted requests that a worker finished.
    pub completed: u64,
    /// Admitted requests still queued when the pool stopped.
    pub abandoned: u64,
    pub summary: UtilizationSummary,
}

/// Serves connections with a fixed queue and pool configuration.
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    capacity: usize,
    worker_count: usize,
    policy: SchedulingPolicy,
    reporter: Reporter,
    metrics: MetricsCollector,
}

impl ConnectionHandler {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            capacity: config.capacity,
            worker_count: config.worker_count,
            policy: config.policy,
            reporter: Reporter::new(config.dump_queue),
            metrics: MetricsCollector::new(),
        }
    }

    /// Runs one session to completion.
    ///
    /// Returns once the client has closed its side (or a read failed), the
    /// pool has been stopped, and every pending response has been written.
    #[instrument(skip(self, stream), fields(capacity = self.capacity, workers = self.worker_count))]
    pub async fn handle<S>(&self, stream: S, peer: String) -> Result<SessionReport, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);

        let tracker = Arc::new(UtilizationTracker::new(self.worker_count));
        tracker.record_snapshot(Timestamp::now(), 0);
        let queue = Arc::new(BoundedJobQueue::with_tracker(
            self.capacity,
            self.policy,
            Arc::clone(&tracker),
        )?);

        let (tx, rx) = mpsc::unbounded_channel::<ResponseRecord>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let sink = completion_sink(tx.clone(), self.reporter, Arc::clone(&queue));
        let pool = WorkerPool::start(self.worker_count, Arc::clone(&queue), sink)?;

        info!(policy = %self.policy, "Session started");

        let mut report = SessionReport::default();
        loop {
            match protocol::read_request(&mut reader).await {
                Ok(Some(request)) => {
                    let job = Job::received_now(request.id, request.sent, request.length);
                    match queue.enqueue(job) {
                        Admission::Accepted => report.accepted += 1,
                        Admission::Rejected(job) => {
                            report.rejected += 1;
                            self.reporter.rejected(&job, Timestamp::now(), &queue);
                            if tx.send(ResponseRecord::rejected(job.id)).is_err() {
                                debug!(job_id = job.id, "Writer gone, dropping rejection");
                            }
                        }
                    }
                }
                Ok(None) => {
                    debug!("Client closed the connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read request, closing session");
                    break;
                }
            }
        }

        // Stopping joins OS threads, keep it off the runtime workers.
        let (pool, stopped) = tokio::task::spawn_blocking(move || {
            let mut pool = pool;
            let result = pool.stop();
            (pool, result)
        })
        .await?;
        stopped?;

        let stats = pool.stats();
        drop(pool);
        report.completed = stats.jobs_completed;
        report.abandoned = queue.len() as u64;
        if report.abandoned > 0 {
            warn!(abandoned = report.abandoned, "Jobs left in queue at shutdown");
        }

        report.summary = tracker.finalize(Timestamp::now());
        self.reporter.summary(&report.summary);
        self.metrics.record_session(&report.summary);

        drop(tx);
        writer_task.await?;

        info!(
            accepted = report.accepted,
            rejected = report.rejected,
            completed = report.completed,
            avg_service_ms = stats.average_service_time().as_millis() as u64,
            "Session finished"
        );

        Ok(report)
    }
}

/// Builds the sink workers call on completion: log the record, then queue
/// the response for the writer task.
fn completion_sink(
    tx: mpsc::UnboundedSender<ResponseRecord>,
    reporter: Reporter,
    queue: Arc<BoundedJobQueue>,
) -> Arc<dyn ResultSink> {
    Arc::new(move |worker_id: usize, job: QueuedJob| {
        reporter.completed(worker_id, &job, &queue);
        if tx.send(ResponseRecord::completed(job.id())).is_err() {
            debug!(job_id = job.id(), "Writer gone, dropping completion");
        }
    })
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<ResponseRecord>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        if let Err(e) = protocol::write_response(&mut writer, &response).await {
            warn!(error = %e, "Failed to write response");
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Failed to shut down writer");
    }
}
