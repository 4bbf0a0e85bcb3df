use std::time::Duration;

use serde::Deserialize;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Base delay multiplied by the attempt number.
    Linear,
    /// Base delay doubled after every attempt.
    Exponential,
}

/// Retry schedule for a single store write: a total attempt ceiling plus the
/// delay shape between attempts. One policy instance is shared by every
/// worker of an upload sink.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first; a batch failing this many times
    /// is terminal.
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, Backoff::Fixed)
    }

    /// Delay to sleep after failed `attempt` (1-based) before the next one.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Linear => self.delay.saturating_mul(attempt.max(1)),
            Backoff::Exponential => self
                .delay
                .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(16))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(200));
    }

    #[test]
    fn linear_delay_scales_with_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Backoff::Linear);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }

    #[test]
    fn exponential_delay_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Backoff::Exponential);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn attempt_ceiling_is_at_least_one() {
        let policy = RetryPolicy::fixed(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
    }
}
