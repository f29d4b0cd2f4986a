//! Process lifecycle: bind, serve, drain, stop.
//!
//! ```text
//! Starting ──bind ok──▶ Serving ──signal/trigger──▶ Draining ──drained──▶ Stopped
//!    │                                                  │
//!    └──bind failed──▶ Crashed                          └──deadline──▶ Aborted
//! ```
//!
//! One deadline covers the whole drain: in-flight requests first, then
//! background tasks with whatever budget is left.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{middleware::from_fn_with_state, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use super::inflight::{track_in_flight, InFlightTracker};
use super::signals::Signals;
use super::tasks::BackgroundTaskRunner;
use super::{startup, LifecycleError, Shutdown};
use crate::config::ShutdownConfig;

/// Longest drain the controller will wait for.
pub const MAX_DRAIN_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    Draining,
    Stopped,
    /// Startup failed; nothing was served.
    Crashed,
    /// The drain deadline expired with work still outstanding.
    Aborted,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Stopped | LifecycleState::Crashed | LifecycleState::Aborted
        )
    }
}

/// Owns the serve loop and shutdown sequencing.
pub struct LifecycleController {
    drain_timeout: Duration,
    shutdown: Shutdown,
    tasks: BackgroundTaskRunner,
    in_flight: InFlightTracker,
    state: watch::Sender<LifecycleState>,
}

impl LifecycleController {
    pub fn new(config: &ShutdownConfig) -> Self {
        Self::with_drain_timeout(config.drain_timeout())
    }

    /// Longer timeouts are capped at [`MAX_DRAIN_TIMEOUT`].
    pub fn with_drain_timeout(drain_timeout: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        if drain_timeout > MAX_DRAIN_TIMEOUT {
            tracing::warn!(
                requested_secs = drain_timeout.as_secs(),
                max_secs = MAX_DRAIN_TIMEOUT.as_secs(),
                "Drain timeout capped"
            );
        }
        Self {
            drain_timeout: drain_timeout.min(MAX_DRAIN_TIMEOUT),
            shutdown: Shutdown::new(),
            tasks: BackgroundTaskRunner::new(),
            in_flight: InFlightTracker::new(),
            state,
        }
    }

    /// Runner whose tasks are awaited during drain.
    pub fn tasks(&self) -> BackgroundTaskRunner {
        self.tasks.clone()
    }

    /// Programmatic trigger, equivalent to an OS shutdown signal.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    fn drain_deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.drain_timeout)
            .or_else(|| now.checked_add(MAX_DRAIN_TIMEOUT))
            .unwrap_or(now)
    }

    pub fn in_flight(&self) -> &InFlightTracker {
        &self.in_flight
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = ?previous, to = ?next, "Lifecycle transition");
    }

    /// Bind `address` and serve `app` until shutdown.
    pub async fn run(&self, address: &str, app: Router) -> Result<(), LifecycleError> {
        let listener = match startup::bind(address).await {
            Ok(listener) => listener,
            Err(e) => {
                self.transition(LifecycleState::Crashed);
                return Err(e);
            }
        };
        self.serve(listener, app).await
    }

    /// Serve `app` on an already bound listener until shutdown, then drain.
    pub async fn serve(&self, listener: TcpListener, app: Router) -> Result<(), LifecycleError> {
        let mut signals = match Signals::install() {
            Ok(signals) => signals,
            Err(e) => {
                self.transition(LifecycleState::Crashed);
                return Err(LifecycleError::SignalInstall(e));
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.transition(LifecycleState::Crashed);
                return Err(LifecycleError::Serve(e));
            }
        };

        let app = app.layer(from_fn_with_state(self.in_flight.clone(), track_in_flight));
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        let mut server: JoinHandle<std::io::Result<()>> = tokio::spawn(
            axum::serve(listener, service)
                .with_graceful_shutdown(self.shutdown.wait_owned())
                .into_future(),
        );

        self.transition(LifecycleState::Serving);
        tracing::info!(addr = %addr, "Server started");

        let exited_early = tokio::select! {
            signal = signals.recv() => {
                tracing::info!(signal, "Shutdown signal received");
                None
            }
            _ = self.shutdown.wait() => {
                tracing::info!("Shutdown requested");
                None
            }
            joined = &mut server => Some(joined),
        };
        // Stops the accept loop and every periodic task tied to the trigger.
        self.shutdown.trigger();

        if let Some(joined) = exited_early {
            self.transition(LifecycleState::Crashed);
            return Err(match server_outcome(joined) {
                Ok(()) => LifecycleError::Serve(std::io::Error::other("server exited unexpectedly")),
                Err(e) => e,
            });
        }

        self.transition(LifecycleState::Draining);
        let deadline = self.drain_deadline();
        tracing::info!(
            addr = %addr,
            in_flight = self.in_flight.active(),
            outstanding_tasks = self.tasks.outstanding(),
            "Draining"
        );

        match tokio::time::timeout_at(deadline, &mut server).await {
            Ok(joined) => {
                if let Err(e) = server_outcome(joined) {
                    self.transition(LifecycleState::Crashed);
                    return Err(e);
                }
            }
            Err(_) => {
                server.abort();
                return Err(self.abort());
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if !self.tasks.close_and_wait(remaining).await {
            return Err(self.abort());
        }

        self.transition(LifecycleState::Stopped);
        tracing::info!(addr = %addr, "Server stopped");
        Ok(())
    }

    fn abort(&self) -> LifecycleError {
        let in_flight = self.in_flight.active();
        let outstanding_tasks = self.tasks.outstanding();
        tracing::error!(
            in_flight,
            outstanding_tasks,
            timeout_secs = self.drain_timeout.as_secs_f64(),
            "Drain deadline exceeded, abandoning outstanding work"
        );
        self.transition(LifecycleState::Aborted);
        LifecycleError::DrainTimeoutExceeded {
            timeout: self.drain_timeout,
            in_flight,
            outstanding_tasks,
        }
    }
}

fn server_outcome(joined: Result<std::io::Result<()>, JoinError>) -> Result<(), LifecycleError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(LifecycleError::Serve(e)),
        Err(e) => Err(LifecycleError::Serve(std::io::Error::other(e))),
    }
}
