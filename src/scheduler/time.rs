//! Clock reads and the busy-wait work simulator.
//!
//! Timestamps are taken from a monotonic clock that is anchored once per
//! process to the wall clock. Readings never go backwards inside a process,
//! and two processes on the same host produce roughly comparable values,
//! which lets client and server records be lined up after the fact.

use std::fmt;
use std::ops::{Add, Sub};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Anchor pairing a monotonic instant with the wall-clock offset observed
/// at the same moment.
static ANCHOR: OnceLock<(Instant, Duration)> = OnceLock::new();

fn anchor() -> (Instant, Duration) {
    *ANCHOR.get_or_init(|| {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        (Instant::now(), wall)
    })
}

/// A point in time, stored as the offset since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The zero timestamp.
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    /// Reads the monotonic clock.
    pub fn now() -> Self {
        let (origin, wall) = anchor();
        Timestamp(wall + origin.elapsed())
    }

    /// Builds a timestamp from an offset since the epoch.
    pub const fn from_duration(since_epoch: Duration) -> Self {
        Timestamp(since_epoch)
    }

    /// Builds a timestamp from fractional seconds.
    ///
    /// Negative or non-finite inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_finite() && secs > 0.0 {
            Timestamp(Duration::from_secs_f64(secs))
        } else {
            Timestamp::ZERO
        }
    }

    /// Offset since the epoch.
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    /// Seconds as a float, the format used in report records.
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.as_secs_f64())
    }
}

/// Spins on the monotonic clock until `duration` has elapsed.
///
/// The calling thread never yields, so the time spent here counts as CPU
/// work. Returns the time actually spent, which is never less than
/// `duration`.
pub fn busywait(duration: Duration) -> Duration {
    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= duration {
            return elapsed;
        }
        std::hint::spin_loop();
    }
}
