use crate::config::RetryConfig;
use std::time::Duration;

/// Exponential backoff between step attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(Duration::from_millis(config.base_delay_ms))
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = RetryPolicy::new(Duration::from_millis(10));
        assert!(policy.delay_for(u32::MAX) >= policy.delay_for(31));
    }

    #[test]
    fn from_config_uses_base_delay() {
        let policy = RetryPolicy::from_config(&RetryConfig { base_delay_ms: 250 });
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
    }
}
