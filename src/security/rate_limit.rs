//! Request rate limiting keyed by client identity
//!
//! # Algorithm: Fixed Window
//!
//! Every client identity gets a counter and the instant its window opened.
//! The first request after the window has expired opens a fresh window.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  FIXED WINDOW (max_requests = 3, window = 60s)                    │
//! │                                                                   │
//! │  t=0s    req ──► count 1  ALLOW   (window opens)                  │
//! │  t=5s    req ──► count 2  ALLOW                                   │
//! │  t=9s    req ──► count 3  ALLOW                                   │
//! │  t=30s   req ──► count 3  DENY    (limit reached)                 │
//! │  t=61s   req ──► count 1  ALLOW   (window expired, reset)         │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The limiter is created once per process and injected into the HTTP
//! router state. A rejected request never reaches the agent.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimitConfig;

/// Windows older than this many periods are dropped on the next sweep
const STALE_WINDOWS: u32 = 2;

/// Per-identity counter
#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    count: u32,
}

// ═══════════════════════════════════════════════════════════════════════════
// RateLimiter (Fixed Window)
// ═══════════════════════════════════════════════════════════════════════════
// HOW TO USE:
//   1. Create once from RateLimitConfig
//   2. Call check(identity) before starting any turn
//   3. Ok → proceed; Err → reject with the limit and window it reports
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window` per identity
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window)
    }

    /// Count one request for `key`
    ///
    /// # Arguments
    ///
    /// * `key` - Client identity (forwarded address or `anonymous`)
    ///
    /// # Returns
    ///
    /// `Err(RateLimitError)` when the identity has used up its window.
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimitError> {
        let mut windows = self.windows.lock();

        if windows.len() > 1024 {
            let horizon = self.window * STALE_WINDOWS;
            windows.retain(|_, w| now.saturating_duration_since(w.opened) < horizon);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            opened: now,
            count: 0,
        });

        if now.saturating_duration_since(entry.opened) >= self.window {
            entry.opened = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            return Err(RateLimitError {
                limit: self.max_requests,
                window: self.window,
            });
        }
        entry.count += 1;
        Ok(())
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of identities currently tracked
    pub fn tracked(&self) -> usize {
        self.windows.lock().len()
    }
}

/// Returned when an identity exceeded its window
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limited: at most {limit} requests per {window:?}")]
pub struct RateLimitError {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitError {
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }
}
