use axum::http::HeaderMap;
use dashmap::DashMap;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::config::{QuotaPolicy, RetryAfter};
use crate::metrics::RATE_LIMIT_ENTRIES;
use crate::models::Access;

pub const UNKNOWN_CLIENT: &str = "unknown";

// Rate limit entry - tracks requests per client/resource key
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { retry_after_secs: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Admission control consulted before every counter access.
///
/// `admit` must be atomic per key: two concurrent calls for the same
/// client and resource may not both observe the last free slot.
pub trait RateLimiter: Send + Sync {
    fn admit(&self, client_id: &str, resource_id: &str, now: Instant) -> Decision;

    /// Drops entries whose window has elapsed, returning how many went.
    fn sweep(&self, now: Instant) -> usize;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// in-process fixed window keyed by client:resource
pub struct FixedWindowLimiter {
    entries: DashMap<String, RateLimitEntry>,
    max_requests: u32,
    window: Duration,
    retry_after: RetryAfter,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration, retry_after: RetryAfter) -> Self {
        Self {
            entries: DashMap::new(),
            max_requests,
            window,
            retry_after,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn retry_after_secs(&self, elapsed: Duration) -> u64 {
        let wait = match self.retry_after {
            RetryAfter::FullWindow => self.window,
            RetryAfter::Remaining => self.window.saturating_sub(elapsed),
        };
        ceil_secs(wait).max(1)
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn admit(&self, client_id: &str, resource_id: &str, now: Instant) -> Decision {
        // the entry guard holds the shard lock until we return
        let mut entry = self
            .entries
            .entry(format!("{client_id}:{resource_id}"))
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        let elapsed = now.saturating_duration_since(entry.window_start);

        // window expired..? reset it
        if elapsed > self.window {
            entry.count = 1;
            entry.window_start = now;
            return Decision::Allow;
        }

        // over limit, leave the entry untouched
        if entry.count >= self.max_requests {
            return Decision::Deny {
                retry_after_secs: self.retry_after_secs(elapsed),
            };
        }

        entry.count += 1;
        Decision::Allow
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.window_start) <= self.window);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

// first X-Forwarded-For address, forgeable - abuse mitigation only
pub fn client_id(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

impl QuotaPolicy {
    pub fn bucket<'a>(&self, key: &'a str, access: Access) -> Cow<'a, str> {
        match self {
            QuotaPolicy::Shared => Cow::Borrowed(key),
            QuotaPolicy::Split => Cow::Owned(format!("{key}#{access}")),
        }
    }
}

// Sweeper - periodically evicts expired entries so the map doesn't grow forever
pub async fn sweeper(limiter: Arc<dyn RateLimiter>, every: Duration) {
    let mut interval = interval(every);
    // first tick fires immediately, nothing to sweep yet
    interval.tick().await;

    tracing::info!(interval = ?every, "rate limit sweeper started");

    loop {
        interval.tick().await;

        let removed = limiter.sweep(Instant::now());
        let remaining = limiter.len();
        RATE_LIMIT_ENTRIES.set(remaining as f64);

        if removed > 0 {
            tracing::debug!(removed, remaining, "swept expired rate limit entries");
        }
    }
}
