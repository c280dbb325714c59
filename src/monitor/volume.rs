//! Volume estimation and stop strategies
//!
//! The estimator plans how many more articles are needed to reach a comment
//! target from the per-article yields seen so far. The stop strategy decides
//! independently when collected volume is enough.

use tracing::debug;

/// Samples needed before the tails are trimmed
const MIN_TRIM_SAMPLES: usize = 5;

/// Share of samples dropped from each tail
const TRIM_RATIO: f64 = 0.2;

/// Tracks per-article yields and advises on widening the article pool
#[derive(Debug, Default)]
pub struct VolumeEstimator {
    counts: Vec<u64>,
}

impl VolumeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one article's yield, clamped to zero
    pub fn add_count(&mut self, count: i64) {
        self.counts.push(count.max(0) as u64);
    }

    pub fn sample_count(&self) -> usize {
        self.counts.len()
    }

    /// Returns the mean yield with the top and bottom 20% dropped
    ///
    /// Below five samples, or when trimming would leave nothing, the plain
    /// mean is returned. An estimator without samples returns 0.
    pub fn current_trimmed_mean(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }

        let mut sorted = self.counts.clone();
        sorted.sort_unstable();

        let trim = if sorted.len() >= MIN_TRIM_SAMPLES {
            (sorted.len() as f64 * TRIM_RATIO).ceil() as usize
        } else {
            0
        };

        let kept = if trim > 0 && sorted.len() > 2 * trim {
            &sorted[trim..sorted.len() - trim]
        } else {
            &sorted[..]
        };

        kept.iter().sum::<u64>() as f64 / kept.len() as f64
    }

    /// Estimates how many more articles are needed to reach `target`
    ///
    /// # Returns
    ///
    /// * `Some(0)` - `collected` already meets the target
    /// * `Some(n)` - ceiling of the remaining volume over the trimmed mean
    /// * `None` - no usable signal yet
    pub fn estimate_remaining_articles(&self, target: u64, collected: u64) -> Option<u64> {
        let remaining = target.saturating_sub(collected);
        if remaining == 0 {
            return Some(0);
        }

        let mean = self.current_trimmed_mean();
        if mean <= 0.0 {
            return None;
        }

        Some((remaining as f64 / mean).ceil() as u64)
    }

    /// Returns true iff an estimate exists and exceeds `remaining_capacity`
    pub fn should_expand(&self, target: u64, collected: u64, remaining_capacity: u64) -> bool {
        match self.estimate_remaining_articles(target, collected) {
            Some(estimate) => {
                debug!(
                    estimate,
                    remaining_capacity, "Volume estimate against remaining capacity"
                );
                estimate > remaining_capacity
            }
            None => false,
        }
    }
}

/// Outcome of a stop strategy evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDecision {
    pub should_stop: bool,
    pub reason: Option<String>,
}

impl VolumeDecision {
    pub fn proceed() -> Self {
        Self {
            should_stop: false,
            reason: None,
        }
    }

    pub fn stop(reason: &str) -> Self {
        Self {
            should_stop: true,
            reason: Some(reason.to_string()),
        }
    }
}

/// Decides after each article whether the run has collected enough
pub trait VolumeStrategy {
    fn decide(&self, current_volume: u64, elapsed_secs: f64) -> VolumeDecision;
}

/// Stops once cumulative volume reaches a fixed target
#[derive(Debug, Clone)]
pub struct FixedTargetStrategy {
    target_comments: u64,
}

impl FixedTargetStrategy {
    pub fn new(target_comments: u64) -> Self {
        Self { target_comments }
    }
}

impl VolumeStrategy for FixedTargetStrategy {
    fn decide(&self, current_volume: u64, _elapsed_secs: f64) -> VolumeDecision {
        if current_volume >= self.target_comments {
            VolumeDecision::stop("TARGET_REACHED")
        } else {
            VolumeDecision::proceed()
        }
    }
}
