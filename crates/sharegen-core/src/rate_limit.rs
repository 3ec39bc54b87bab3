//! Sliding-window rate limiter shared by every outbound request.
//!
//! Uses `Mutex` from std; the lock is never held while sleeping, so
//! concurrent workers only serialize on the window bookkeeping.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default admissions per window (provider POST quota)
pub const DEFAULT_CAPACITY: usize = 40;

/// Default window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Admits at most `capacity` operations in any rolling `window`.
///
/// Each call to [`acquire()`](RateLimiter::acquire) is one admission.
/// Retries must acquire again; nothing bypasses the limiter.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. A capacity of zero is treated as one.
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Block until an admission is available, then take it.
    ///
    /// Returns the instant the admission was granted. The wait is bounded
    /// by one window length per contended retry of the loop.
    pub fn acquire(&self) -> Instant {
        loop {
            let wait = {
                let mut admitted = self
                    .admitted
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                while admitted
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    admitted.pop_front();
                }
                match admitted.front() {
                    Some(oldest) if admitted.len() >= self.capacity => {
                        self.window - now.duration_since(*oldest)
                    }
                    _ => {
                        admitted.push_back(now);
                        return now;
                    }
                }
            };
            log::debug!(
                "Rate limit: sleeping {:.2}s to respect {}/{:?}",
                wait.as_secs_f64(),
                self.capacity,
                self.window
            );
            std::thread::sleep(wait);
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}
