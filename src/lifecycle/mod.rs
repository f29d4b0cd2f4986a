//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Serving (bind failure → Crashed)
//!
//! Serving (controller.rs):
//!     Root handler → in-flight guard → gatekeeping chain → handler
//!
//! Shutdown (signals.rs, shutdown.rs):
//!     SIGTERM/SIGINT or programmatic trigger → Stop accepting
//!     → Drain in-flight requests → Drain background tasks (tasks.rs) → Stopped
//! ```
//!
//! # Design Decisions
//! - Single drain deadline for requests and background tasks
//! - Forced shutdown is an error returned to the caller, not a panic
//! - Periodic loops observe the same shutdown trigger as the server

use std::time::Duration;

use thiserror::Error;

pub mod controller;
pub mod inflight;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod tasks;

pub use controller::{LifecycleController, LifecycleState};
pub use inflight::InFlightTracker;
pub use shutdown::Shutdown;
pub use tasks::BackgroundTaskRunner;

/// Process-level failures.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to bind listener on {address}: {source}")]
    ListenerBindFailure {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install signal handlers: {0}")]
    SignalInstall(#[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error(
        "drain deadline of {timeout:?} exceeded with {in_flight} requests and \
         {outstanding_tasks} background tasks outstanding"
    )]
    DrainTimeoutExceeded {
        timeout: Duration,
        in_flight: u64,
        outstanding_tasks: usize,
    },
}
