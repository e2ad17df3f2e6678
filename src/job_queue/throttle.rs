//! Dispatch throttling for worker pools.
//!
//! Implements a sliding-window rate limiter shared by all workers so the
//! total stream of jobs reaching the evaluators stays bounded regardless of
//! how many pools are draining queues.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Rate limiter consulted by workers before dispatching claimed jobs.
#[async_trait]
pub trait DispatchThrottler: Send + Sync {
    /// Check if a job may be dispatched right now.
    ///
    /// Returns Ok(()) if allowed, or Err(wait_duration) indicating how long
    /// the caller should wait before checking again.
    async fn check_dispatch(&self) -> Result<(), Duration>;

    /// Record a dispatched job against the window.
    async fn record_dispatch(&self);
}

/// Sliding-window throttler enforcing a jobs-per-second ceiling.
///
/// Workers call `check_dispatch` before claiming and `record_dispatch` after
/// a successful claim; the window spans one second and old entries are
/// pruned on every touch.
pub struct SlidingWindowThrottler {
    max_per_window: usize,
    window: Duration,
    recent: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowThrottler {
    /// Create a throttler allowing at most `max_per_second` dispatches in
    /// any one-second window. A limit of zero is clamped to one.
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_window: max_per_second.max(1) as usize,
            window: Duration::from_secs(1),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Remove entries that have aged out of the window.
    fn prune_old_entries(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = entries.front() {
            if now.duration_since(*front) >= window {
                entries.pop_front();
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl DispatchThrottler for SlidingWindowThrottler {
    async fn check_dispatch(&self) -> Result<(), Duration> {
        let mut recent = self.recent.lock().await;
        let now = Instant::now();
        Self::prune_old_entries(&mut recent, now, self.window);

        if recent.len() < self.max_per_window {
            return Ok(());
        }

        // Window full: the caller should wait until the oldest entry ages out.
        let wait = recent
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(Duration::ZERO);
        Err(wait)
    }

    async fn record_dispatch(&self) {
        let mut recent = self.recent.lock().await;
        let now = Instant::now();
        Self::prune_old_entries(&mut recent, now, self.window);
        recent.push_back(now);
    }
}

/// Throttler that never blocks, used when the rate limit is disabled.
pub struct NoOpThrottler;

#[async_trait]
impl DispatchThrottler for NoOpThrottler {
    async fn check_dispatch(&self) -> Result<(), Duration> {
        Ok(())
    }

    async fn record_dispatch(&self) {}
}
