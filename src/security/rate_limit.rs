//! Per-client rate limiting.
//!
//! Every client address owns a token bucket. All buckets live in one map
//! behind one lock: admission (lookup-or-create, refill, consume) and the
//! idle sweep never interleave, so nobody sees a half-updated bucket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::http::error::ApiError;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny,
}

/// Token bucket for a single client.
#[derive(Debug, Clone)]
struct ClientBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        if now > self.last_seen {
            self.last_seen = now;
        }

        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Admission control keyed by client address.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, ClientBucket>>,
    enabled: bool,
    refill_rate: f64,
    capacity: f64,
    sweep_interval: Duration,
    idle_timeout: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            enabled: config.enabled,
            refill_rate: config.requests_per_second,
            capacity: f64::from(config.burst),
            sweep_interval: config.sweep_interval(),
            idle_timeout: config.idle_timeout(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // A panic while holding the lock cannot leave a bucket half-written:
    // every mutation is a plain field store.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit or deny one request from `client`.
    pub fn admit(&self, client: &str) -> Admission {
        self.admit_at(client, Instant::now())
    }

    /// Admit or deny one request from `client` as of `now`.
    pub fn admit_at(&self, client: &str, now: Instant) -> Admission {
        if !self.enabled {
            return Admission::Allow;
        }

        let mut buckets = self.lock();
        let bucket = buckets
            .entry(client.to_owned())
            .or_insert_with(|| ClientBucket::new(self.capacity, now));

        if bucket.try_acquire(self.capacity, self.refill_rate, now) {
            Admission::Allow
        } else {
            Admission::Deny
        }
    }

    /// Evict clients idle for longer than the idle timeout. Returns how many
    /// were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_seen) <= self.idle_timeout);
        let evicted = before - buckets.len();
        metrics::record_rate_limiter_clients(buckets.len());
        evicted
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Whether `client` currently has a bucket.
    pub fn is_tracking(&self, client: &str) -> bool {
        self.lock().contains_key(client)
    }

    /// Run the idle sweep every sweep interval until shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: Shutdown) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.sweep_interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep_at(Instant::now());
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = limiter.tracked_clients(), "Idle clients swept");
                        }
                    }
                    _ = shutdown.wait() => {
                        tracing::debug!("Rate limiter sweep stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Derive the rate-limit key for a request: the peer IP address.
pub fn client_key(request: &Request<Body>) -> Result<String, ApiError> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or_else(|| ApiError::MalformedClientAddress("peer address unavailable".into()))
}

/// Middleware rejecting clients that exhausted their bucket.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let key = match client_key(&request) {
        Ok(key) => key,
        Err(e) => return e.into_response(),
    };

    match limiter.admit(&key) {
        Admission::Allow => next.run(request).await,
        Admission::Deny => {
            tracing::debug!(client = %key, "Rate limit exceeded");
            metrics::record_rate_limited();
            ApiError::RateLimited.into_response()
        }
    }
}
