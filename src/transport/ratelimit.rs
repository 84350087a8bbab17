//! Fixed-window request-rate admission for the protocol path.

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    opened: Instant,
    admitted: u32,
}

/// Admits up to `max` requests per `window`, then rejects until the window
/// rolls over. The ceiling protects the process; it is not a fairness
/// mechanism.
pub struct RateLimiter {
    max: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            state: Mutex::new(Window {
                opened: Instant::now(),
                admitted: 0,
            }),
        }
    }

    /// Count one request against the current window; true if admitted.
    pub fn try_admit(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if now.duration_since(state.opened) >= self.window {
            state.opened = now;
            state.admitted = 0;
        }
        if state.admitted < self.max {
            state.admitted += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_is_enforced() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());
        assert!(!limiter.try_admit());
    }

    #[test]
    fn window_rollover_resets_the_count() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_admit());
    }
}
