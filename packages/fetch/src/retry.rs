//! Exponential backoff with jitter for the resumable fetcher.

use std::time::Duration;

use rand::Rng;

/// Backoff schedule for retryable fetch failures.
///
/// Defaults match the fetcher's contract: initial 5s, multiplier 2,
/// cap 60s, jitter ±25%, max 5 retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub cap: Duration,
    pub jitter: f64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            multiplier: 2.0,
            cap: Duration::from_secs(60),
            jitter: 0.25,
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// The delay before retry attempt `attempt` (1-indexed), with
    /// jitter applied as a uniform draw from `delay * (1 ± jitter)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let unjittered = self.initial.as_secs_f64() * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = unjittered.min(self.cap.as_secs_f64());

        let mut rng = rand::rng();
        let spread = capped * self.jitter;
        let jittered = capped + rng.random_range(-spread..=spread);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delay_is_near_initial() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(1).as_secs_f64();
        assert!((3.75..=6.25).contains(&delay), "delay was {delay}");
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(10).as_secs_f64();
        assert!(delay <= 75.0, "delay was {delay}");
    }
}
