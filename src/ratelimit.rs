//! Sliding-window rate limiting for license validation endpoints.
//!
//! Guards the validation path against brute-forcing license keys: each
//! `identifier|action` pair gets an ordered sequence of request instants,
//! purged lazily as the window slides. Pure in-memory state behind a single
//! mutex; fully-expired keys are swept every few minutes, piggybacked on
//! `check` so no background thread is needed.

use crate::clock::Clock;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How often fully-expired keys are swept out of the map.
const SWEEP_INTERVAL_SECS: i64 = 5 * 60;

/// Throttling policy: at most `max_requests` per `window` per identifier.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Maximum requests allowed within one window.
    pub max_requests: u32,

    /// Length of the sliding window.
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    /// Default policy for license validation: 10 requests per 60 seconds.
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the request is allowed.
    pub allowed: bool,

    /// Requests remaining in the current window (0 when denied).
    pub remaining: u32,

    /// The configured per-window maximum.
    pub limit: u32,

    /// When the oldest in-window request falls out of the window.
    pub reset_at: DateTime<Utc>,

    /// How long a denied client must wait before retrying.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// Seconds until retry, rounded up. Zero when the request was allowed.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after
            .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0))
            .unwrap_or(0)
    }

    /// Render the decision as HTTP response headers for throttled endpoints.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_at.timestamp().to_string()),
        ];
        if !self.allowed {
            headers.push(("Retry-After", self.retry_after_secs().to_string()));
        }
        headers
    }
}

struct LimiterState {
    buckets: HashMap<String, Vec<DateTime<Utc>>>,
    last_sweep: DateTime<Utc>,
}

/// Sliding-window request counter keyed by `identifier|action`.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a rate limiter with the given policy.
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_utc();
        Self {
            policy,
            clock,
            state: Mutex::new(LimiterState {
                buckets: HashMap::new(),
                last_sweep: now,
            }),
        }
    }

    /// Check whether a request from `identifier` for `action` is allowed.
    ///
    /// Allowed requests are recorded immediately; denied requests never
    /// mutate the bucket. Timestamps older than the window are purged on
    /// every check.
    pub fn check(&self, identifier: &str, action: &str) -> RateLimitDecision {
        let now = self.clock.now_utc();
        let window = ChronoDuration::from_std(self.policy.window)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));
        let window_start = now - window;
        let key = format!("{}|{}", identifier, action);

        let mut state = self.state.lock().expect("rate limiter lock");

        if (now - state.last_sweep).num_seconds() >= SWEEP_INTERVAL_SECS {
            state
                .buckets
                .retain(|_, stamps| stamps.iter().any(|t| *t > window_start));
            state.last_sweep = now;
        }

        let bucket = state.buckets.entry(key).or_default();
        bucket.retain(|t| *t > window_start);

        if (bucket.len() as u32) < self.policy.max_requests {
            bucket.push(now);
            let oldest = bucket[0];
            RateLimitDecision {
                allowed: true,
                remaining: self.policy.max_requests - bucket.len() as u32,
                limit: self.policy.max_requests,
                reset_at: oldest + window,
                retry_after: None,
            }
        } else {
            // A zero-request policy denies with an empty bucket; reset is
            // one full window out in that case.
            let reset_at = match bucket.first() {
                Some(oldest) => *oldest + window,
                None => now + window,
            };
            let retry_after = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                limit: self.policy.max_requests,
                reset_at,
                retry_after: Some(retry_after),
            }
        }
    }

    /// Number of identifier/action keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.state.lock().expect("rate limiter lock").buckets.len()
    }
}

/// Derive a stable client identifier from a peer address.
///
/// Hashing avoids holding raw client IPs in limiter state or logs.
pub fn client_identifier(peer_addr: &str) -> String {
    let hash = Sha256::digest(peer_addr.as_bytes());
    hex::encode(&hash[..16])
}
