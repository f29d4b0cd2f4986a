//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (trusted origins, preflight)
//!     → rate_limit.rs (per-IP token bucket)
//!     → Pass to authentication
//! ```
//!
//! # Design Decisions
//! - Fail closed: a request without a usable peer address is a server fault
//! - No trust in client input

pub mod cors;
pub mod rate_limit;

pub use rate_limit::{Admission, RateLimiter};
