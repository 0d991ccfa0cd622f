//! Retry policy for throttled lookups.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cooldown schedule applied after a rate-limit response.
///
/// The default is a fixed 10 second cooldown with no attempt cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first throttled attempt.
    pub cooldown: Duration,
    /// Multiplier applied per further throttled attempt. `1.0` keeps the
    /// cooldown fixed.
    pub backoff_factor: f64,
    /// Upper bound for any single delay.
    pub max_cooldown: Duration,
    /// Maximum throttled attempts per key. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(10),
            backoff_factor: 1.0,
            max_cooldown: Duration::from_secs(300),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed cooldown, unbounded attempts.
    pub fn fixed(cooldown: Duration) -> Self {
        Self {
            cooldown,
            ..Self::default()
        }
    }

    /// Doubling cooldown with an attempt cap.
    pub fn exponential(cooldown: Duration, max_cooldown: Duration, max_attempts: u32) -> Self {
        Self {
            cooldown,
            backoff_factor: 2.0,
            max_cooldown,
            max_attempts: Some(max_attempts),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after the `attempt`-th throttled response (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_factor.max(1.0).powi(exponent);
        let secs = self.cooldown.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_cooldown.as_secs_f64() {
            return self.max_cooldown.max(self.cooldown);
        }
        Duration::from_secs_f64(secs)
    }

    /// Whether another attempt is permitted after `attempt` throttled ones.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}
