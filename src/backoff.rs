/// file: src/backoff.rs
/// description: Bounded exponential backoff shared by the duplex channel and the SSE stream
use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retries scheduled before giving up; the failure after the last retry schedules nothing.
    pub max_attempts: u32,
    /// Full jitter in `[0, delay]`; off by default so delays are reproducible.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the retry that follows the `failures`-th consecutive failure.
    ///
    /// Returns `None` once `failures` exceeds `max_attempts`, meaning the caller
    /// must stop retrying.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures > self.max_attempts {
            return None;
        }

        let delay = self.raw_delay(failures);
        if self.jitter {
            let upper = delay.as_millis() as u64;
            Some(Duration::from_millis(fastrand::u64(0..=upper)))
        } else {
            Some(delay)
        }
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures > self.max_attempts
    }

    fn raw_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_doubles_until_exhausted() {
        let policy = BackoffPolicy::default();

        let delays: Vec<_> = (1..=6).map(|n| policy.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(1000)),
                Some(Duration::from_millis(2000)),
                Some(Duration::from_millis(4000)),
                Some(Duration::from_millis(8000)),
                Some(Duration::from_millis(16_000)),
                None,
            ]
        );
        assert!(policy.is_exhausted(6));
        assert!(!policy.is_exhausted(5));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy::new(Duration::from_millis(1000), Duration::from_millis(30_000), 20);

        assert_eq!(policy.delay_for(5), Some(Duration::from_millis(16_000)));
        assert_eq!(policy.delay_for(6), Some(Duration::from_millis(30_000)));
        assert_eq!(policy.delay_for(20), Some(Duration::from_millis(30_000)));
        assert_eq!(policy.delay_for(21), None);
    }

    #[test]
    fn test_zero_failures_schedules_nothing() {
        assert_eq!(BackoffPolicy::default().delay_for(0), None);
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = BackoffPolicy::default().with_jitter(true);
        for _ in 0..50 {
            let delay = policy.delay_for(3).unwrap();
            assert!(delay <= Duration::from_millis(4000));
        }
    }
}
