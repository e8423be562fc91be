//! One-line records describing what happened to each request.
//!
//! Records are emitted through `tracing` at info level under the
//! `queueserve::report` target so they can be filtered independently of
//! diagnostics. Times are seconds with microsecond precision.

use std::time::Duration;

use tracing::info;

use crate::scheduler::{BoundedJobQueue, Job, QueuedJob, Timestamp, UtilizationSummary};

/// Target used for every report record.
pub const REPORT_TARGET: &str = "queueserve::report";

fn secs(d: Duration) -> String {
    format!("{:.6}", d.as_secs_f64())
}

fn opt_ts(ts: Option<Timestamp>) -> String {
    ts.unwrap_or(Timestamp::ZERO).to_string()
}

/// `T<worker> R<id>:<sent>,<length>,<receipt>,<start>,<completion>`
pub fn completion_line(worker_id: usize, job: &QueuedJob) -> String {
    format!(
        "T{} R{}:{},{},{},{},{}",
        worker_id,
        job.id(),
        job.job.arrival_ts,
        secs(job.requested_duration()),
        job.job.receipt_ts(),
        opt_ts(job.start_ts),
        opt_ts(job.completion_ts),
    )
}

/// `X<id>:<sent>,<length>,<reject>`
pub fn rejection_line(job: &Job, rejected_at: Timestamp) -> String {
    format!(
        "X{}:{},{},{}",
        job.id,
        job.arrival_ts,
        secs(job.requested_duration),
        rejected_at,
    )
}

/// `Q:[R<id>,R<id>,...]` in dequeue order.
pub fn queue_dump_line(ids: &[u64]) -> String {
    let entries: Vec<String> = ids.iter().map(|id| format!("R{}", id)).collect();
    format!("Q:[{}]", entries.join(","))
}

/// Emits report records for one connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    dump_queue: bool,
}

impl Reporter {
    pub fn new(dump_queue: bool) -> Self {
        Self { dump_queue }
    }

    pub fn completed(&self, worker_id: usize, job: &QueuedJob, queue: &BoundedJobQueue) {
        info!(target: REPORT_TARGET, "{}", completion_line(worker_id, job));
        self.dump(queue);
    }

    pub fn rejected(&self, job: &Job, rejected_at: Timestamp, queue: &BoundedJobQueue) {
        info!(target: REPORT_TARGET, "{}", rejection_line(job, rejected_at));
        self.dump(queue);
    }

    pub fn summary(&self, summary: &UtilizationSummary) {
        info!(target: REPORT_TARGET, "{}", summary);
    }

    fn dump(&self, queue: &BoundedJobQueue) {
        if self.dump_queue {
            info!(target: REPORT_TARGET, "{}", queue_dump_line(&queue.ids()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: f64) -> Timestamp {
        Timestamp::from_secs_f64(secs)
    }

    #[test]
    fn test_completion_line() {
        let job = Job::new(3, ts(10.0), Duration::from_millis(250), ts(10.5));
        let mut queued = QueuedJob::new(job);
        queued.mark_started(ts(11.0));
        queued.mark_completed(ts(11.25));

        assert_eq!(
            completion_line(0, &queued),
            "T0 R3:10.000000,0.250000,10.500000,11.000000,11.250000"
        );
        assert!(completion_line(5, &queued).starts_with("T5 R3:"));
    }

    #[test]
    fn test_rejection_line() {
        let job = Job::new(8, ts(2.0), Duration::from_micros(1500), ts(2.5));
        assert_eq!(rejection_line(&job, ts(2.5)), "X8:2.000000,0.001500,2.500000");
    }

    #[test]
    fn test_queue_dump_line() {
        assert_eq!(queue_dump_line(&[]), "Q:[]");
        assert_eq!(queue_dump_line(&[4, 1, 9]), "Q:[R4,R1,R9]");
    }
}
