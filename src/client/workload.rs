//! Seeded generator of request arrivals and lengths.
//!
//! Inter-arrival gaps and requested lengths are both exponentially
//! distributed, which makes the offered load a Poisson process with
//! exponential service demand.

use std::time::Duration;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Exp;
use serde::{Deserialize, Serialize};

use super::ClientError;

/// Longest mean gap or mean length accepted, in seconds.
pub const MAX_MEAN_SECS: f64 = 86_400.0;

/// Shape of the offered load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadProfile {
    /// Mean requests per second.
    pub arrival_rate: f64,
    /// Mean requested length in seconds.
    pub mean_service: f64,
    /// Number of requests to send.
    pub count: u64,
    /// Seed for reproducible runs. A random seed is drawn when absent.
    pub seed: Option<u64>,
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self {
            arrival_rate: 10.0,
            mean_service: 0.05,
            count: 100,
            seed: None,
        }
    }
}

impl LoadProfile {
    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.arrival_rate.is_finite() && self.arrival_rate > 0.0) {
            return Err(ClientError::InvalidProfile(format!(
                "arrival rate must be positive, got {}",
                self.arrival_rate
            )));
        }
        if !(self.mean_service.is_finite() && self.mean_service > 0.0) {
            return Err(ClientError::InvalidProfile(format!(
                "mean service time must be positive, got {}",
                self.mean_service
            )));
        }
        if self.arrival_rate < 1.0 / MAX_MEAN_SECS {
            return Err(ClientError::InvalidProfile(format!(
                "arrival rate must be at least 1/{} per second, got {}",
                MAX_MEAN_SECS, self.arrival_rate
            )));
        }
        if self.mean_service > MAX_MEAN_SECS {
            return Err(ClientError::InvalidProfile(format!(
                "mean service time must be at most {}s, got {}",
                MAX_MEAN_SECS, self.mean_service
            )));
        }
        Ok(())
    }
}

/// One planned request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedRequest {
    pub id: u64,
    /// Delay after the previous request.
    pub gap: Duration,
    /// Requested processing time.
    pub length: Duration,
}

/// Draws planned requests from a seeded RNG.
pub struct Workload {
    rng: ChaCha8Rng,
    arrivals: Exp<f64>,
    lengths: Exp<f64>,
    next_id: u64,
    remaining: u64,
}

impl Workload {
    pub fn new(profile: &LoadProfile) -> Result<Self, ClientError> {
        profile.validate()?;

        let arrivals = Exp::new(profile.arrival_rate)
            .map_err(|e| ClientError::InvalidProfile(e.to_string()))?;
        let lengths = Exp::new(1.0 / profile.mean_service)
            .map_err(|e| ClientError::InvalidProfile(e.to_string()))?;
        let seed = profile.seed.unwrap_or_else(rand::random);

        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            arrivals,
            lengths,
            next_id: 0,
            remaining: profile.count,
        })
    }
}

impl Iterator for Workload {
    type Item = PlannedRequest;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let gap = self.rng.sample(self.arrivals);
        let length = self.rng.sample(self.lengths);
        let id = self.next_id;
        self.next_id += 1;

        Some(PlannedRequest {
            id,
            gap: sample_to_duration(gap),
            length: sample_to_duration(length),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

/// Converts a sampled number of seconds, saturating at `Duration::MAX`.
fn sample_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(seed: u64) -> LoadProfile {
        LoadProfile {
            arrival_rate: 20.0,
            mean_service: 0.01,
            count: 2000,
            seed: Some(seed),
        }
    }

    #[test]
    fn test_same_seed_same_workload() {
        let a: Vec<_> = Workload::new(&profile(7)).unwrap().collect();
        let b: Vec<_> = Workload::new(&profile(7)).unwrap().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2000);
    }

    #[test]
    fn test_different_seed_differs() {
        let a: Vec<_> = Workload::new(&profile(1)).unwrap().take(10).collect();
        let b: Vec<_> = Workload::new(&profile(2)).unwrap().take(10).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_sequential() {
        let ids: Vec<u64> = Workload::new(&profile(3)).unwrap().take(5).map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_means_roughly_match_profile() {
        let planned: Vec<_> = Workload::new(&profile(11)).unwrap().collect();
        let n = planned.len() as f64;
        let mean_gap = planned.iter().map(|r| r.gap.as_secs_f64()).sum::<f64>() / n;
        let mean_len = planned.iter().map(|r| r.length.as_secs_f64()).sum::<f64>() / n;

        // 1/20 s and 10 ms, with loose bounds for 2000 samples
        assert!((0.04..0.06).contains(&mean_gap), "mean gap {}", mean_gap);
        assert!((0.008..0.012).contains(&mean_len), "mean length {}", mean_len);
    }

    #[test]
    fn test_invalid_profile() {
        let bad = LoadProfile {
            arrival_rate: 0.0,
            ..LoadProfile::default()
        };
        assert!(matches!(
            Workload::new(&bad),
            Err(ClientError::InvalidProfile(_))
        ));

        let bad = LoadProfile {
            mean_service: -1.0,
            ..LoadProfile::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_tiny_arrival_rate_rejected() {
        let slow = LoadProfile {
            arrival_rate: 1e-30,
            mean_service: 0.05,
            count: 1,
            seed: Some(1),
        };
        assert!(matches!(
            slow.validate(),
            Err(ClientError::InvalidProfile(_))
        ));
        assert!(Workload::new(&slow).is_err());
    }

    #[test]
    fn test_huge_mean_service_rejected() {
        let long = LoadProfile {
            mean_service: 1e30,
            ..LoadProfile::default()
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_slowest_allowed_profile_samples() {
        let slowest = LoadProfile {
            arrival_rate: 1.0 / MAX_MEAN_SECS,
            mean_service: MAX_MEAN_SECS,
            count: 50,
            seed: Some(9),
        };
        assert_eq!(Workload::new(&slowest).unwrap().count(), 50);
    }

    #[test]
    fn test_sample_to_duration_saturates() {
        assert_eq!(sample_to_duration(1e30), Duration::MAX);
        assert_eq!(sample_to_duration(-1.0), Duration::ZERO);
        assert_eq!(sample_to_duration(0.25), Duration::from_millis(250));
    }
}
