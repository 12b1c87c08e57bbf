//! Rate Limiter (C4): per-adapter sliding-window request admission (§4.4).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding window of recent request timestamps for a single adapter.
/// Guarded by one mutex: admission is a single critical section, matching
/// the "safe under concurrent admission attempts" requirement of §4.4.
pub struct RateLimiter {
    requests_per_minute: u32,
    timestamps: Mutex<VecDeque<Instant>>,
}

pub struct RateLimitDenied {
    pub retry_after: Duration,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Attempts to admit one request now. On denial, returns the duration
    /// until the oldest timestamp in the window ages out.
    pub async fn try_admit(&self) -> Result<(), RateLimitDenied> {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().await;
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) >= WINDOW {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() as u32 >= self.requests_per_minute {
            let retry_after = timestamps
                .front()
                .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(WINDOW);
            return Err(RateLimitDenied { retry_after });
        }

        timestamps.push_back(now);
        Ok(())
    }
}
