//! Job definitions for the scheduler.
//!
//! This module defines the core job types used in the scheduling system:
//!
//! - `Job`: A unit of work submitted by a client
//! - `QueuedJob`: A job admitted to the queue, with processing timestamps
//! - `SchedulingPolicy`: The ordering discipline applied on enqueue

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::time::Timestamp;
use crate::error::ConfigError;

/// Ordering discipline applied when a job is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchedulingPolicy {
    /// First-In-First-Out: dequeue order equals admission order.
    #[default]
    #[serde(alias = "fifo")]
    Fifo,
    /// Shortest-Job-Next: ascending requested duration, ties by arrival.
    #[serde(alias = "sjn")]
    Sjn,
}

impl SchedulingPolicy {
    /// Returns the canonical name of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingPolicy::Fifo => "FIFO",
            SchedulingPolicy::Sjn => "SJN",
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIFO" => Ok(SchedulingPolicy::Fifo),
            "SJN" => Ok(SchedulingPolicy::Sjn),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

/// A unit of work submitted by a client.
///
/// The receipt timestamp is fixed at construction, before the job is
/// offered to the queue, and cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Caller-supplied identifier. Uniqueness is not checked.
    pub id: u64,
    /// When the client claims to have sent the request. Informational only.
    pub arrival_ts: Timestamp,
    /// How long processing must busy-wait. Sort key under SJN.
    pub requested_duration: Duration,
    receipt_ts: Timestamp,
}

impl Job {
    /// Creates a job stamped with the given receipt time.
    pub fn new(
        id: u64,
        arrival_ts: Timestamp,
        requested_duration: Duration,
        receipt_ts: Timestamp,
    ) -> Self {
        Self {
            id,
            arrival_ts,
            requested_duration,
            receipt_ts,
        }
    }

    /// Creates a job stamped with the current time as its receipt time.
    pub fn received_now(id: u64, arrival_ts: Timestamp, requested_duration: Duration) -> Self {
        Self::new(id, arrival_ts, requested_duration, Timestamp::now())
    }

    /// When the server accepted the request.
    pub fn receipt_ts(&self) -> Timestamp {
        self.receipt_ts
    }
}

/// A job that was admitted to the queue.
///
/// `start_ts` and `completion_ts` stay `None` while the job waits and are
/// filled in by the single worker that processes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    /// The admitted job.
    pub job: Job,
    /// When a worker began processing.
    pub start_ts: Option<Timestamp>,
    /// When processing ended.
    pub completion_ts: Option<Timestamp>,
}

impl QueuedJob {
    /// Wraps an admitted job with blank processing timestamps.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            start_ts: None,
            completion_ts: None,
        }
    }

    /// Identifier of the underlying job.
    pub fn id(&self) -> u64 {
        self.job.id
    }

    /// Requested processing time of the underlying job.
    pub fn requested_duration(&self) -> Duration {
        self.job.requested_duration
    }

    /// Records the start of processing.
    pub fn mark_started(&mut self, at: Timestamp) {
        self.start_ts = Some(at);
    }

    /// Records the end of processing.
    pub fn mark_completed(&mut self, at: Timestamp) {
        self.completion_ts = Some(at);
    }

    /// Time spent waiting in the queue, once processing has started.
    pub fn queue_wait(&self) -> Option<Duration> {
        self.start_ts.map(|start| start - self.job.receipt_ts())
    }

    /// Time spent processing, once processing has completed.
    pub fn service_time(&self) -> Option<Duration> {
        match (self.start_ts, self.completion_ts) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Returns whether a worker has finished processing this job.
    pub fn is_completed(&self) -> bool {
        self.completion_ts.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_job(id: u64, millis: u64) -> Job {
        Job::new(
            id,
            Timestamp::from_secs_f64(1.0),
            Duration::from_millis(millis),
            Timestamp::from_secs_f64(2.0),
        )
    }

    #[test]
    fn test_policy_parse_case_insensitive() {
        assert_eq!("FIFO".parse::<SchedulingPolicy>().unwrap(), SchedulingPolicy::Fifo);
        assert_eq!("sjn".parse::<SchedulingPolicy>().unwrap(), SchedulingPolicy::Sjn);
        assert_eq!(" Sjn ".parse::<SchedulingPolicy>().unwrap(), SchedulingPolicy::Sjn);
    }

    #[test]
    fn test_policy_parse_unknown() {
        let err = "LIFO".parse::<SchedulingPolicy>().unwrap_err();
        assert!(err.to_string().contains("LIFO"));
    }

    #[test]
    fn test_policy_display_roundtrip() {
        for policy in [SchedulingPolicy::Fifo, SchedulingPolicy::Sjn] {
            assert_eq!(policy.to_string().parse::<SchedulingPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_policy_default_is_fifo() {
        assert_eq!(SchedulingPolicy::default(), SchedulingPolicy::Fifo);
    }

    #[test]
    fn test_queued_job_lifecycle() {
        let mut queued = QueuedJob::new(create_test_job(7, 100));
        assert_eq!(queued.id(), 7);
        assert!(queued.start_ts.is_none());
        assert!(queued.queue_wait().is_none());
        assert!(queued.service_time().is_none());
        assert!(!queued.is_completed());

        queued.mark_started(Timestamp::from_secs_f64(2.5));
        assert_eq!(queued.queue_wait(), Some(Duration::from_millis(500)));

        queued.mark_completed(Timestamp::from_secs_f64(2.6));
        assert!(queued.is_completed());
        let service = queued.service_time().unwrap();
        assert!((service.as_secs_f64() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_receipt_is_preserved() {
        let job = create_test_job(1, 10);
        let queued = QueuedJob::new(job.clone());
        assert_eq!(queued.job.receipt_ts(), job.receipt_ts());
    }
}
