/// Fixed-window rate limiter keyed by subject
///
/// One window per (event kind, actor) pair, so a noisy actor cannot
/// suppress anyone else's notifications. Windows are created lazily on
/// first dispatch and reset in place once the window elapses; the key space
/// is bounded by active actors, so there is no background sweep.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RatePolicy {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited,
}

impl RateDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, RateDecision::Limited)
    }
}

#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one dispatch attempt for `subject`. Allowed attempts increment
    /// the window; limited attempts do not.
    pub fn check(&self, subject: &str, policy: RatePolicy) -> RateDecision {
        self.check_at(subject, policy, Instant::now())
    }

    fn check_at(&self, subject: &str, policy: RatePolicy, now: Instant) -> RateDecision {
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());

        let window = windows.entry(subject.to_string()).or_insert(RateWindow {
            window_start: now,
            count: 0,
        });

        if now.duration_since(window.window_start) >= policy.window {
            window.window_start = now;
            window.count = 0;
        }

        if window.count >= policy.limit {
            RateDecision::Limited
        } else {
            window.count += 1;
            RateDecision::Allowed
        }
    }

    pub fn tracked_subjects(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }
}
