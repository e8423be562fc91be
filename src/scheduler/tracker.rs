//! Time-weighted queue occupancy and server utilization.
//!
//! The queue appends a [`Snapshot`] on every length transition while it
//! still holds its own lock, so the log is an exact trace of the queue
//! length over time. Workers report busy intervals as they finish jobs.
//! [`UtilizationTracker::finalize`] integrates both into a
//! [`UtilizationSummary`] when the session ends.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use super::time::Timestamp;

/// Queue length observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub timestamp: Timestamp,
    pub queue_length: usize,
}

/// Metrics computed when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct UtilizationSummary {
    /// Time-weighted average queue length.
    pub avg_queue_length: f64,
    /// Fraction of the window during which at least one worker was busy.
    pub utilization: f64,
    /// Busy time summed over workers, divided by window times worker count.
    pub mean_worker_utilization: f64,
    /// Length of the observation window.
    pub elapsed: Duration,
    /// Number of snapshots integrated, including the final one.
    pub snapshots: usize,
}

impl fmt::Display for UtilizationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time-Weighted Average Queue Length: {:.3}, Utilization: {:.3}",
            self.avg_queue_length, self.utilization
        )
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    snapshots: Vec<Snapshot>,
    busy_intervals: Vec<(Timestamp, Timestamp)>,
    busy_total: Duration,
}

/// Collects queue-length snapshots and worker busy intervals.
#[derive(Debug)]
pub struct UtilizationTracker {
    state: Mutex<TrackerState>,
    worker_count: usize,
}

impl Default for UtilizationTracker {
    fn default() -> Self {
        Self::new(1)
    }
}

impl UtilizationTracker {
    /// Creates an empty tracker for a pool of `worker_count` workers.
    pub fn new(worker_count: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            worker_count: worker_count.max(1),
        }
    }

    /// Appends one snapshot.
    pub fn record_snapshot(&self, timestamp: Timestamp, queue_length: usize) {
        self.state.lock().snapshots.push(Snapshot {
            timestamp,
            queue_length,
        });
    }

    /// Accumulates one completed processing interval.
    pub fn record_busy_interval(&self, start: Timestamp, end: Timestamp) {
        if end <= start {
            return;
        }
        let mut state = self.state.lock();
        state.busy_intervals.push((start, end));
        state.busy_total += end - start;
    }

    /// Total busy time summed over all workers.
    pub fn busy_time(&self) -> Duration {
        self.state.lock().busy_total
    }

    /// Copy of the snapshot log.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.state.lock().snapshots.clone()
    }

    /// Number of snapshots recorded so far.
    pub fn snapshot_count(&self) -> usize {
        self.state.lock().snapshots.len()
    }

    /// Appends a closing snapshot at `ts` and computes the summary.
    ///
    /// The closing snapshot repeats the last observed length. With no
    /// prior snapshots or a zero-length window both metrics are 0.
    pub fn finalize(&self, ts: Timestamp) -> UtilizationSummary {
        let mut state = self.state.lock();
        let last_length = state.snapshots.last().map_or(0, |s| s.queue_length);
        state.snapshots.push(Snapshot {
            timestamp: ts,
            queue_length: last_length,
        });

        let snapshots = &state.snapshots;
        let mut area = 0.0;
        let mut elapsed = Duration::ZERO;
        for pair in snapshots.windows(2) {
            let dt = pair[1].timestamp - pair[0].timestamp;
            area += pair[0].queue_length as f64 * dt.as_secs_f64();
            elapsed += dt;
        }

        let count = snapshots.len();
        if elapsed.is_zero() {
            return UtilizationSummary {
                elapsed,
                snapshots: count,
                ..Default::default()
            };
        }

        let window_start = snapshots[0].timestamp;
        let window_end = window_start + elapsed;
        let total = elapsed.as_secs_f64();

        let (union, sum) = busy_within(&state.busy_intervals, window_start, window_end);

        UtilizationSummary {
            avg_queue_length: area / total,
            utilization: (union.as_secs_f64() / total).clamp(0.0, 1.0),
            mean_worker_utilization: (sum.as_secs_f64() / (total * self.worker_count as f64))
                .clamp(0.0, 1.0),
            elapsed,
            snapshots: count,
        }
    }
}

/// Clips intervals to `[from, to]` and returns the measure of their union
/// together with their plain sum.
fn busy_within(
    intervals: &[(Timestamp, Timestamp)],
    from: Timestamp,
    to: Timestamp,
) -> (Duration, Duration) {
    let mut clipped: Vec<(Timestamp, Timestamp)> = intervals
        .iter()
        .map(|&(start, end)| (start.max(from), end.min(to)))
        .filter(|(start, end)| end > start)
        .collect();
    clipped.sort_unstable();

    let sum: Duration = clipped.iter().map(|&(start, end)| end - start).sum();

    let mut union = Duration::ZERO;
    let mut current: Option<(Timestamp, Timestamp)> = None;
    for (start, end) in clipped {
        current = match current {
            Some((cur_start, cur_end)) if start <= cur_end => Some((cur_start, cur_end.max(end))),
            Some((cur_start, cur_end)) => {
                union += cur_end - cur_start;
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }
    if let Some((cur_start, cur_end)) = current {
        union += cur_end - cur_start;
    }

    (union, sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: f64) -> Timestamp {
        Timestamp::from_secs_f64(secs)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_finalize_without_snapshots() {
        let tracker = UtilizationTracker::new(1);
        let summary = tracker.finalize(ts(5.0));
        assert_eq!(summary.avg_queue_length, 0.0);
        assert_eq!(summary.utilization, 0.0);
        assert_eq!(summary.snapshots, 1);
    }

    #[test]
    fn test_finalize_zero_elapsed() {
        let tracker = UtilizationTracker::new(1);
        tracker.record_snapshot(ts(5.0), 3);
        let summary = tracker.finalize(ts(5.0));
        assert_eq!(summary.avg_queue_length, 0.0);
        assert_eq!(summary.utilization, 0.0);
        assert!(summary.elapsed.is_zero());
    }

    #[test]
    fn test_time_weighted_average_includes_tail() {
        let tracker = UtilizationTracker::new(1);
        // length 0 for 1s, 2 for 1s, 1 for 2s (tail up to finalize)
        tracker.record_snapshot(ts(10.0), 0);
        tracker.record_snapshot(ts(11.0), 2);
        tracker.record_snapshot(ts(12.0), 1);
        let summary = tracker.finalize(ts(14.0));

        assert!(approx(summary.avg_queue_length, (0.0 + 2.0 + 2.0) / 4.0));
        assert_eq!(summary.elapsed, Duration::from_secs(4));
        assert_eq!(summary.snapshots, 4);
    }

    #[test]
    fn test_single_worker_utilization() {
        let tracker = UtilizationTracker::new(1);
        tracker.record_snapshot(ts(0.0), 0);
        tracker.record_busy_interval(ts(1.0), ts(2.0));
        tracker.record_busy_interval(ts(3.0), ts(4.0));
        let summary = tracker.finalize(ts(4.0));

        assert!(approx(summary.utilization, 0.5));
        assert!(approx(summary.mean_worker_utilization, 0.5));
        assert_eq!(tracker.busy_time(), Duration::from_secs(2));
    }

    #[test]
    fn test_overlapping_workers_stay_bounded() {
        let tracker = UtilizationTracker::new(2);
        tracker.record_snapshot(ts(0.0), 0);
        tracker.record_busy_interval(ts(0.0), ts(2.0));
        tracker.record_busy_interval(ts(1.0), ts(2.0));
        let summary = tracker.finalize(ts(2.0));

        // At least one worker busy the whole window
        assert!(approx(summary.utilization, 1.0));
        // 3s of work over 2 workers x 2s
        assert!(approx(summary.mean_worker_utilization, 0.75));
    }

    #[test]
    fn test_busy_outside_window_is_clipped() {
        let tracker = UtilizationTracker::new(1);
        tracker.record_snapshot(ts(10.0), 0);
        tracker.record_busy_interval(ts(5.0), ts(11.0));
        let summary = tracker.finalize(ts(12.0));

        assert!(approx(summary.utilization, 0.5));
        assert!(summary.utilization <= 1.0);
    }

    #[test]
    fn test_empty_interval_ignored() {
        let tracker = UtilizationTracker::new(1);
        tracker.record_busy_interval(ts(3.0), ts(3.0));
        tracker.record_busy_interval(ts(4.0), ts(3.0));
        assert_eq!(tracker.busy_time(), Duration::ZERO);
    }

    #[test]
    fn test_average_bounded_by_max_length() {
        let tracker = UtilizationTracker::new(1);
        let capacity = 4;
        let lengths = [0, 1, 2, 3, 4, 3, 4, 2, 0];
        for (i, len) in lengths.iter().enumerate() {
            tracker.record_snapshot(ts(i as f64 * 0.25), *len);
        }
        let summary = tracker.finalize(ts(3.0));
        assert!(summary.avg_queue_length >= 0.0);
        assert!(summary.avg_queue_length <= capacity as f64);
    }

    #[test]
    fn test_busy_within_merges_union() {
        let intervals = [
            (ts(0.0), ts(2.0)),
            (ts(1.0), ts(3.0)),
            (ts(5.0), ts(6.0)),
        ];
        let (union, sum) = busy_within(&intervals, ts(0.0), ts(10.0));
        assert_eq!(union, Duration::from_secs(4));
        assert_eq!(sum, Duration::from_secs(5));
    }

    #[test]
    fn test_summary_display() {
        let summary = UtilizationSummary {
            avg_queue_length: 1.23456,
            utilization: 0.5,
            ..Default::default()
        };
        let text = summary.to_string();
        assert!(text.contains("1.235"));
        assert!(text.contains("0.500"));
    }
}
