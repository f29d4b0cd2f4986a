//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use catalog_api::config::SeedPrincipal;
use catalog_api::http::{AppState, Collaborators, HttpServer};
use catalog_api::lifecycle::{BackgroundTaskRunner, LifecycleController, LifecycleError, LifecycleState};
use catalog_api::notify::{Notifier, NotifyError};
use catalog_api::{ApiConfig, Shutdown};

/// A 26-character base-32 token starting with `prefix`.
pub fn token(prefix: &str) -> String {
    format!("{prefix:A<26}")
}

pub fn seed(id: i64, activated: bool, permissions: &[&str], prefix: &str) -> SeedPrincipal {
    SeedPrincipal {
        id,
        activated,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        token: token(prefix),
        ttl_hours: 24,
    }
}

/// Principals every test server knows about.
#[allow(dead_code)]
pub mod principals {
    pub const READER: &str = "READER";
    pub const WRITER: &str = "WRITER";
    pub const INACTIVE: &str = "INACTIVE";
    pub const NO_PERMISSIONS: &str = "NOPERMS";
    pub const UNKNOWN: &str = "UNKNOWN";
}

pub fn default_seed() -> Vec<SeedPrincipal> {
    use principals::*;
    vec![
        seed(1, true, &["movies:read"], READER),
        seed(2, true, &["movies:read", "movies:write"], WRITER),
        seed(3, false, &["movies:read", "movies:write"], INACTIVE),
        seed(4, true, &[], NO_PERMISSIONS),
    ]
}

/// Notifier that keeps every notification for inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, Value)>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    /// Wait for the first `event` sent to `recipient` and return its data.
    pub async fn wait_for(&self, recipient: &str, event: &str) -> Value {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let found = self
                    .sent
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|(to, name, _)| to == recipient && name == event)
                    .map(|(_, _, data)| data.clone());
                if let Some(data) = found {
                    return data;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("notification was never sent")
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, event: &str, data: Value) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), event.to_string(), data));
        Ok(())
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub state: watch::Receiver<LifecycleState>,
    pub tasks: BackgroundTaskRunner,
    pub notifications: Arc<RecordingNotifier>,
    pub handle: JoinHandle<Result<(), LifecycleError>>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the controller to finish.
    pub async fn stop(self) -> Result<(), LifecycleError> {
        self.shutdown.trigger();
        self.handle.await.expect("controller task panicked")
    }
}

/// Start a server on an ephemeral port with `extra` routes behind the full
/// middleware stack.
pub async fn start_server(mut config: ApiConfig, drain: Duration, extra: Router<AppState>) -> TestServer {
    if config.auth.seed.is_empty() {
        config.auth.seed = default_seed();
    }
    // bcrypt's minimum cost.
    config.auth.password_cost = 4;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let controller = LifecycleController::with_drain_timeout(drain);
    let mut state = controller.state();
    let shutdown = controller.shutdown();
    let tasks = controller.tasks();

    let notifications = Arc::new(RecordingNotifier::default());
    let mut collaborators = Collaborators::in_memory(&config.auth.seed).unwrap();
    collaborators.notifier = notifications.clone();
    let app = HttpServer::new(&config, collaborators, tasks.clone())
        .merge(extra)
        .into_router();

    let handle = tokio::spawn(async move { controller.serve(listener, app).await });

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == LifecycleState::Serving),
    )
    .await
    .expect("server did not start")
    .expect("controller dropped before serving");

    TestServer {
        addr,
        shutdown,
        state,
        tasks,
        notifications,
        handle,
    }
}

/// Client that opens a fresh connection per request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn bearer(prefix: &str) -> String {
    format!("Bearer {}", token(prefix))
}
