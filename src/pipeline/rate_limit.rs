//! Sliding-window rate limiter for outbound fetches.
//!
//! Keeps the `burst` most recent acquisition instants. Once the window is
//! full, a new acquisition waits until the oldest recorded instant is at
//! least `window` old, so no more than `burst` acquisitions ever complete
//! within any interval of length `window`. With `burst = 1` this is a plain
//! minimum spacing between fetches.
//!
//! Instants come from the monotonic clock; wall-clock adjustments cannot
//! shorten a wait.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug)]
pub struct RateLimiter {
    burst: usize,
    window: Duration,
    recent: VecDeque<Instant>,
}

impl RateLimiter {
    /// `burst` is clamped to at least 1.
    pub fn new(burst: usize, window: Duration) -> Self {
        let burst = burst.max(1);
        Self {
            burst,
            window,
            recent: VecDeque::with_capacity(burst),
        }
    }

    pub fn burst(&self) -> usize {
        self.burst
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for a slot, then claim it.
    pub async fn acquire(&mut self) {
        if let Some(wait) = self.pending_wait(Instant::now()) {
            debug!("Rate limit: waiting {}ms for a fetch slot", wait.as_millis());
            sleep(wait).await;
        }
        if self.recent.len() >= self.burst {
            self.recent.pop_front();
        }
        self.recent.push_back(Instant::now());
    }

    /// How long an acquisition starting at `now` has to wait.
    fn pending_wait(&self, now: Instant) -> Option<Duration> {
        if self.recent.len() < self.burst {
            return None;
        }
        let oldest = *self.recent.front()?;
        let elapsed = now.saturating_duration_since(oldest);
        (elapsed < self.window).then(|| self.window - elapsed)
    }
}
