//! Bounded in-memory job queue with pluggable ordering.
//!
//! This module provides the queue shared by one connection and its worker
//! pool:
//!
//! - Fixed-capacity ring buffer allocated once at construction
//! - Non-blocking admission: a full queue rejects instead of waiting
//! - Blocking dequeue for workers, one wake-up per admitted job
//! - FIFO or SJN placement decided on enqueue
//!
//! # Synchronization
//!
//! One mutex covers the ring buffer, its occupied count, and the snapshot
//! append into the [`UtilizationTracker`], so every recorded snapshot
//! matches the true queue length at that instant. A condition variable
//! signals "job available" to blocked workers. Shutdown injects release
//! tokens through the same condition variable.

use std::collections::TryReserveError;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use super::job::{Job, QueuedJob, SchedulingPolicy};
use super::time::Timestamp;
use super::tracker::UtilizationTracker;
use crate::metrics::MetricsCollector;

/// Errors that can occur while constructing a queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Capacity below one slot.
    #[error("Queue capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    /// The ring buffer could not be allocated.
    #[error("Failed to allocate {capacity} queue slots: {source}")]
    Allocation {
        capacity: usize,
        #[source]
        source: TryReserveError,
    },
}

/// Outcome of offering a job to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The job was placed in the queue.
    Accepted,
    /// The queue was full. The job is handed back untouched.
    Rejected(Job),
}

impl Admission {
    /// Returns whether the job was admitted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

/// Outcome of a blocking dequeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeued {
    /// A job removed from the head of the queue.
    Job(QueuedJob),
    /// A release token injected by [`BoundedJobQueue::release`].
    Released,
}

/// Ring buffer state guarded by the queue mutex.
#[derive(Debug)]
struct Ring {
    slots: Vec<Option<QueuedJob>>,
    head: usize,
    len: usize,
    /// Pending release tokens, consumed before any job.
    releases: usize,
}

impl Ring {
    fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity)?;
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots,
            head: 0,
            len: 0,
            releases: 0,
        })
    }

    fn index(&self, offset: usize) -> usize {
        (self.head + offset) % self.slots.len()
    }

    fn get(&self, offset: usize) -> Option<&QueuedJob> {
        self.slots[self.index(offset)].as_ref()
    }

    /// Offset of the first resident job strictly longer than `duration`,
    /// or the tail if there is none. Equal durations keep arrival order.
    fn sjn_offset(&self, duration: Duration) -> usize {
        (0..self.len)
            .find(|&offset| {
                self.get(offset)
                    .is_some_and(|queued| queued.requested_duration() > duration)
            })
            .unwrap_or(self.len)
    }

    /// Shifts `[offset, len)` one slot toward the tail and writes `job` at
    /// `offset`. The caller guarantees a free slot.
    fn insert_at(&mut self, offset: usize, job: QueuedJob) {
        debug_assert!(self.len < self.slots.len());
        debug_assert!(offset <= self.len);

        for i in (offset..self.len).rev() {
            let from = self.index(i);
            let to = self.index(i + 1);
            self.slots[to] = self.slots[from].take();
        }
        let at = self.index(offset);
        self.slots[at] = Some(job);
        self.len += 1;
    }

    fn pop_front(&mut self) -> Option<QueuedJob> {
        if self.len == 0 {
            return None;
        }
        let job = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        job
    }
}

/// Fixed-capacity job queue shared by a connection and its workers.
#[derive(Debug)]
pub struct BoundedJobQueue {
    ring: Mutex<Ring>,
    available: Condvar,
    capacity: usize,
    policy: SchedulingPolicy,
    tracker: Arc<UtilizationTracker>,
    metrics: MetricsCollector,
}

impl BoundedJobQueue {
    /// Creates a queue with its own single-worker tracker.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidCapacity` if `capacity` is zero and
    /// `QueueError::Allocation` if the slots cannot be allocated.
    pub fn new(capacity: usize, policy: SchedulingPolicy) -> Result<Self, QueueError> {
        Self::with_tracker(capacity, policy, Arc::new(UtilizationTracker::default()))
    }

    /// Creates a queue that records its snapshots into `tracker`.
    pub fn with_tracker(
        capacity: usize,
        policy: SchedulingPolicy,
        tracker: Arc<UtilizationTracker>,
    ) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity(capacity));
        }
        let ring = Ring::with_capacity(capacity)
            .map_err(|source| QueueError::Allocation { capacity, source })?;

        Ok(Self {
            ring: Mutex::new(ring),
            available: Condvar::new(),
            capacity,
            policy,
            tracker,
            metrics: MetricsCollector::new(),
        })
    }

    /// Offers a job to the queue without blocking.
    ///
    /// On success the job is placed according to the policy, a snapshot is
    /// recorded and one waiting worker is woken. A full queue returns
    /// `Admission::Rejected` and leaves every piece of state unchanged.
    pub fn enqueue(&self, job: Job) -> Admission {
        let mut ring = self.ring.lock();
        if ring.len == self.capacity {
            self.metrics.record_rejection();
            return Admission::Rejected(job);
        }

        let offset = match self.policy {
            SchedulingPolicy::Fifo => ring.len,
            SchedulingPolicy::Sjn => ring.sjn_offset(job.requested_duration),
        };
        ring.insert_at(offset, QueuedJob::new(job));

        self.tracker.record_snapshot(Timestamp::now(), ring.len);
        self.metrics.set_queue_depth(ring.len);
        self.available.notify_one();

        Admission::Accepted
    }

    /// Removes the head job, blocking until one is available.
    ///
    /// Pending release tokens take precedence over queued jobs, so a worker
    /// asked to stop never picks up more work.
    pub fn dequeue(&self) -> Dequeued {
        let mut ring = self.ring.lock();
        loop {
            if ring.releases > 0 {
                ring.releases -= 1;
                return Dequeued::Released;
            }
            if let Some(job) = self.take_head(&mut ring) {
                return Dequeued::Job(job);
            }
            self.available.wait(&mut ring);
        }
    }

    /// Removes the head job if there is one, without blocking.
    pub fn try_dequeue(&self) -> Option<QueuedJob> {
        let mut ring = self.ring.lock();
        self.take_head(&mut ring)
    }

    fn take_head(&self, ring: &mut Ring) -> Option<QueuedJob> {
        let job = ring.pop_front()?;
        self.tracker.record_snapshot(Timestamp::now(), ring.len);
        self.metrics.set_queue_depth(ring.len);
        Some(job)
    }

    /// Injects `count` release tokens and wakes every blocked worker.
    ///
    /// Each token lets exactly one `dequeue` call return
    /// `Dequeued::Released`.
    pub fn release(&self, count: usize) {
        let mut ring = self.ring.lock();
        ring.releases += count;
        self.available.notify_all();
    }

    /// Current number of queued jobs. Advisory only.
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    /// Returns whether the queue currently holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ordering discipline applied on enqueue.
    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Tracker receiving this queue's snapshots.
    pub fn tracker(&self) -> &Arc<UtilizationTracker> {
        &self.tracker
    }

    /// Identifiers of resident jobs in dequeue order.
    pub fn ids(&self) -> Vec<u64> {
        let ring = self.ring.lock();
        (0..ring.len)
            .filter_map(|offset| ring.get(offset).map(QueuedJob::id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn create_test_job(id: u64, millis: u64) -> Job {
        Job::received_now(id, Timestamp::now(), Duration::from_millis(millis))
    }

    fn drain(queue: &BoundedJobQueue) -> Vec<u64> {
        std::iter::from_fn(|| queue.try_dequeue().map(|q| q.id())).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = BoundedJobQueue::new(0, SchedulingPolicy::Fifo).unwrap_err();
        assert!(matches!(err, QueueError::InvalidCapacity(0)));
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedJobQueue::new(8, SchedulingPolicy::Fifo).unwrap();
        for (id, millis) in [(1, 50), (2, 10), (3, 30), (4, 10)] {
            assert!(queue.enqueue(create_test_job(id, millis)).is_accepted());
        }
        assert_eq!(drain(&queue), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sjn_order() {
        let queue = BoundedJobQueue::new(3, SchedulingPolicy::Sjn).unwrap();
        queue.enqueue(create_test_job(5, 5));
        queue.enqueue(create_test_job(1, 1));
        queue.enqueue(create_test_job(3, 3));
        assert_eq!(queue.ids(), vec![1, 3, 5]);
        assert_eq!(drain(&queue), vec![1, 3, 5]);
    }

    #[test]
    fn test_sjn_ties_keep_arrival_order() {
        let queue = BoundedJobQueue::new(4, SchedulingPolicy::Sjn).unwrap();
        queue.enqueue(create_test_job(10, 20));
        queue.enqueue(create_test_job(11, 20));
        queue.enqueue(create_test_job(12, 5));
        queue.enqueue(create_test_job(13, 20));
        assert_eq!(drain(&queue), vec![12, 10, 11, 13]);
    }

    #[test]
    fn test_sjn_insert_across_wraparound() {
        let queue = BoundedJobQueue::new(4, SchedulingPolicy::Sjn).unwrap();
        // Advance head so the resident jobs straddle the end of the buffer
        for id in 0..3 {
            queue.enqueue(create_test_job(id, 1));
        }
        assert_eq!(drain(&queue), vec![0, 1, 2]);

        queue.enqueue(create_test_job(40, 40));
        queue.enqueue(create_test_job(30, 30));
        queue.enqueue(create_test_job(20, 20));
        queue.enqueue(create_test_job(10, 10));
        assert_eq!(queue.len(), 4);
        assert_eq!(drain(&queue), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_sjn_only_resident_jobs_reordered() {
        let queue = BoundedJobQueue::new(4, SchedulingPolicy::Sjn).unwrap();
        queue.enqueue(create_test_job(1, 100));
        let first = queue.try_dequeue().unwrap();
        assert_eq!(first.id(), 1);

        queue.enqueue(create_test_job(2, 1));
        assert_eq!(drain(&queue), vec![2]);
    }

    #[test]
    fn test_rejection_on_full_queue() {
        let queue = BoundedJobQueue::new(2, SchedulingPolicy::Fifo).unwrap();
        assert!(queue.enqueue(create_test_job(1, 1)).is_accepted());
        assert!(queue.enqueue(create_test_job(2, 1)).is_accepted());
        let snapshots_before = queue.tracker().snapshot_count();

        match queue.enqueue(create_test_job(3, 1)) {
            Admission::Rejected(job) => assert_eq!(job.id, 3),
            Admission::Accepted => panic!("third job should be rejected"),
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.ids(), vec![1, 2]);
        assert_eq!(queue.tracker().snapshot_count(), snapshots_before);
    }

    #[test]
    fn test_snapshots_follow_length() {
        let queue = BoundedJobQueue::new(4, SchedulingPolicy::Fifo).unwrap();
        queue.enqueue(create_test_job(1, 1));
        queue.enqueue(create_test_job(2, 1));
        queue.try_dequeue();
        queue.enqueue(create_test_job(3, 1));

        let lengths: Vec<usize> = queue
            .tracker()
            .snapshots()
            .iter()
            .map(|s| s.queue_length)
            .collect();
        assert_eq!(lengths, vec![1, 2, 1, 2]);

        let snapshots = queue.tracker().snapshots();
        assert!(snapshots.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_capacity_invariant_under_mixed_operations() {
        let capacity = 5;
        let queue = BoundedJobQueue::new(capacity, SchedulingPolicy::Sjn).unwrap();
        let mut accepted = 0usize;
        let mut removed = 0usize;

        for step in 0u64..200 {
            if step % 3 == 2 {
                if queue.try_dequeue().is_some() {
                    removed += 1;
                }
            } else if queue.enqueue(create_test_job(step, step % 7)).is_accepted() {
                accepted += 1;
            }
            let len = queue.len();
            assert!(len <= capacity);
            assert_eq!(len, accepted - removed);
        }
    }

    #[test]
    fn test_dequeue_blocks_until_enqueue() {
        let queue = Arc::new(BoundedJobQueue::new(2, SchedulingPolicy::Fifo).unwrap());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_finished());

        queue.enqueue(create_test_job(42, 1));
        match consumer.join().unwrap() {
            Dequeued::Job(job) => assert_eq!(job.id(), 42),
            Dequeued::Released => panic!("expected a job"),
        }
    }

    #[test]
    fn test_release_wakes_blocked_workers() {
        let queue = Arc::new(BoundedJobQueue::new(2, SchedulingPolicy::Fifo).unwrap());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.dequeue())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        queue.release(3);

        for consumer in consumers {
            assert_eq!(consumer.join().unwrap(), Dequeued::Released);
        }
    }

    #[test]
    fn test_release_takes_precedence_over_jobs() {
        let queue = BoundedJobQueue::new(2, SchedulingPolicy::Fifo).unwrap();
        queue.enqueue(create_test_job(1, 1));
        queue.release(1);
        assert_eq!(queue.dequeue(), Dequeued::Released);
        // The job stays queued until a later dequeue
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_no_loss_no_duplication_with_many_consumers() {
        let queue = Arc::new(BoundedJobQueue::new(64, SchedulingPolicy::Fifo).unwrap());
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Dequeued::Job(job) = queue.dequeue() {
                        seen.push(job.id());
                    }
                    seen
                })
            })
            .collect();

        let mut accepted = HashSet::new();
        for id in 0..500u64 {
            let mut job = create_test_job(id, 0);
            // Retry until admitted so every id is delivered once
            loop {
                match queue.enqueue(job) {
                    Admission::Accepted => break,
                    Admission::Rejected(back) => {
                        job = back;
                        thread::yield_now();
                    }
                }
            }
            accepted.insert(id);
        }

        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        queue.release(4);

        let mut delivered = Vec::new();
        for consumer in consumers {
            delivered.extend(consumer.join().unwrap());
        }
        let unique: HashSet<u64> = delivered.iter().copied().collect();
        assert_eq!(delivered.len(), 500);
        assert_eq!(unique, accepted);
    }

    #[test]
    fn test_accessors() {
        let queue = BoundedJobQueue::new(3, SchedulingPolicy::Sjn).unwrap();
        assert_eq!(queue.capacity(), 3);
        assert_eq!(queue.policy(), SchedulingPolicy::Sjn);
        assert!(queue.is_empty());
    }
}
