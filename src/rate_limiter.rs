//! Sliding-window rate limiter.
//!
//! Keeps the timestamps of recently issued requests and makes callers wait
//! until one more request fits inside the trailing window. The lock is held
//! across the wait, so concurrent callers are admitted one at a time and
//! each pays its own delay.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

pub struct RateLimiter {
    max_requests: usize,
    time_window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Allow at most `max_requests` within any trailing `time_window`.
    ///
    /// A cap of zero is treated as one.
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            time_window,
            requests: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Wait until a request may be issued, then record it.
    pub async fn acquire(&self) {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();

        while let Some(&oldest) = requests.front() {
            if now.duration_since(oldest) > self.time_window {
                requests.pop_front();
            } else {
                break;
            }
        }

        if requests.len() >= self.max_requests {
            if let Some(oldest) = requests.pop_front() {
                let ready_at = oldest + self.time_window;
                if ready_at > now {
                    tracing::debug!(
                        wait_ms = (ready_at - now).as_millis() as u64,
                        "Rate limit window full, waiting"
                    );
                    sleep_until(ready_at).await;
                }
            }
        }

        requests.push_back(Instant::now());
    }

    /// Number of requests currently recorded in the window.
    #[cfg(test)]
    async fn in_flight_window(&self) -> usize {
        let requests = self.requests.lock().await;
        let now = Instant::now();
        requests
            .iter()
            .filter(|t| now.duration_since(**t) <= self.time_window)
            .count()
    }
}
