//! In-flight request tracking.
//!
//! Every request entering the root handler holds a guard for its lifetime.
//! The count is reported when draining starts and when the drain deadline
//! is missed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::observability::metrics;

/// Counts requests currently being handled.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. The returned guard decrements on drop, including
    /// when the handler future is dropped mid-flight.
    pub fn track(&self) -> InFlightGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_in_flight(now);
        InFlightGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Guard held for one request's lifetime.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_in_flight(now);
    }
}

/// Middleware holding an [`InFlightGuard`] around the rest of the stack.
pub async fn track_in_flight(
    State(tracker): State<InFlightTracker>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let _guard = tracker.track();
    next.run(request).await
}
