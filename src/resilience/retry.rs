//! Retry policy: exponential backoff with jitter (§4.3).

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, ..Default::default() }
    }

    /// Delay before attempt `k+1` given 0-indexed completed attempt `k`:
    /// `2^k` seconds plus uniform jitter in `[0, self.jitter]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = Duration::from_secs(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy { max_retries: 3, jitter: Duration::from_millis(0) };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy { max_retries: 1, jitter: Duration::from_millis(100) };
        for _ in 0..50 {
            let d = policy.delay_for_attempt(0);
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_secs(1) + Duration::from_millis(100));
        }
    }
}
