//! Adaptive request pacing
//!
//! The governor sleeps a uniformly drawn delay before every request and
//! adjusts the delay window from observed status codes: a short window of
//! throttle rejections steps the delay up, a long quiet window steps it back
//! down towards the baseline, and the ban status stops it for good.

use crate::config::{AutoThrottleConfig, RateLimitConfig};
use rand::Rng;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{error, info, warn};

/// Spread used when the configured window has none
const MIN_SPREAD: f64 = 1.0;

/// A pacing transition worth persisting as an operational event
#[derive(Debug, Clone, PartialEq)]
pub enum GovernorEvent {
    StepUp { from: f64, to: f64, ratio: f64 },
    StepDown { from: f64, to: f64, ratio: f64 },
    Stopped { status: u16, reason: String },
}

impl GovernorEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StepUp { .. } => "THROTTLE_UP",
            Self::StepDown { .. } => "THROTTLE_DOWN",
            Self::Stopped { .. } => "STOP_LIMIT",
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::StepUp { from, to, ratio } => format!(
                "Throttle up: rejection ratio {:.2}%, delay {:.2}s -> {:.2}s",
                ratio * 100.0,
                from,
                to
            ),
            Self::StepDown { from, to, ratio } => format!(
                "Throttle down: recovery ratio {:.2}%, delay {:.2}s -> {:.2}s",
                ratio * 100.0,
                from,
                to
            ),
            Self::Stopped { reason, .. } => reason.clone(),
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::StepUp { from, to, ratio } | Self::StepDown { from, to, ratio } => {
                json!({ "from": from, "to": to, "ratio": ratio })
            }
            Self::Stopped { status, .. } => json!({ "status": status }),
        }
    }
}

/// Sliding-window adaptive rate governor
#[derive(Debug)]
pub struct RateGovernor {
    baseline_min: f64,
    min_delay: f64,
    max_delay: f64,
    spread: f64,
    policy: AutoThrottleConfig,
    short_window: VecDeque<bool>,
    long_window: VecDeque<bool>,
    stop_reason: Option<String>,
}

impl RateGovernor {
    pub fn new(limits: &RateLimitConfig, policy: &AutoThrottleConfig) -> Self {
        let configured_spread = limits.max_delay - limits.min_delay;
        let spread = if configured_spread > 0.0 {
            configured_spread
        } else {
            MIN_SPREAD
        };

        let min_delay = limits.min_delay.max(0.0);
        let max_delay = if limits.max_delay < min_delay {
            min_delay + spread
        } else {
            limits.max_delay
        };

        Self {
            baseline_min: limits.baseline_min_delay.max(0.0),
            min_delay,
            max_delay,
            spread,
            policy: policy.clone(),
            short_window: VecDeque::with_capacity(policy.window),
            long_window: VecDeque::with_capacity(policy.recovery_window),
            stop_reason: None,
        }
    }

    /// Draws the next delay uniformly from `[min_delay, max_delay]`
    ///
    /// A stopped governor always returns zero.
    pub fn next_delay(&self) -> Duration {
        if self.is_stopped() || self.max_delay <= 0.0 {
            return Duration::ZERO;
        }

        let secs = if self.max_delay > self.min_delay {
            rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
        } else {
            self.min_delay
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Suspends the caller for the next drawn delay
    pub async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Feeds one response status into the windows
    ///
    /// # Returns
    ///
    /// The pacing transition this observation caused, if any
    pub fn observe(&mut self, status: u16) -> Option<GovernorEvent> {
        if self.is_stopped() {
            return None;
        }

        if self.policy.stop_on_ban && status == self.policy.ban_status {
            let reason = format!("Received ban status {}", status);
            error!("Rate governor stopped: {}", reason);
            self.stop_reason = Some(reason.clone());
            return Some(GovernorEvent::Stopped { status, reason });
        }

        let throttled = status == self.policy.throttle_status;
        push_bounded(&mut self.short_window, throttled, self.policy.window);
        push_bounded(&mut self.long_window, throttled, self.policy.recovery_window);

        if self.short_window.len() == self.policy.window {
            let ratio = rejection_ratio(&self.short_window);
            if ratio > self.policy.up_ratio {
                let from = self.min_delay;
                self.set_min_delay(from + self.policy.step_up);
                self.short_window.clear();
                warn!(
                    "Throttle up: rejection ratio {:.2} > {:.2}, delay {:.2}s -> {:.2}s",
                    ratio, self.policy.up_ratio, from, self.min_delay
                );
                return Some(GovernorEvent::StepUp {
                    from,
                    to: self.min_delay,
                    ratio,
                });
            }
        }

        if self.long_window.len() == self.policy.recovery_window {
            let ratio = rejection_ratio(&self.long_window);
            if ratio < self.policy.down_ratio && self.min_delay > self.baseline_min {
                let from = self.min_delay;
                self.set_min_delay((from - self.policy.step_down).max(self.baseline_min));
                self.long_window.clear();
                info!(
                    "Throttle down: recovery ratio {:.2}, delay {:.2}s -> {:.2}s",
                    ratio, from, self.min_delay
                );
                return Some(GovernorEvent::StepDown {
                    from,
                    to: self.min_delay,
                    ratio,
                });
            }
        }

        None
    }

    fn set_min_delay(&mut self, min_delay: f64) {
        self.min_delay = min_delay.max(0.0);
        self.max_delay = self.min_delay + self.spread;
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_reason.is_some()
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn ban_status(&self) -> u16 {
        self.policy.ban_status
    }

    pub fn min_delay(&self) -> f64 {
        self.min_delay
    }

    pub fn max_delay(&self) -> f64 {
        self.max_delay
    }

    pub fn short_window_len(&self) -> usize {
        self.short_window.len()
    }

    pub fn long_window_len(&self) -> usize {
        self.long_window.len()
    }
}

fn push_bounded(window: &mut VecDeque<bool>, value: bool, capacity: usize) {
    if window.len() == capacity {
        window.pop_front();
    }
    window.push_back(value);
}

fn rejection_ratio(window: &VecDeque<bool>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().filter(|&&t| t).count() as f64 / window.len() as f64
}
