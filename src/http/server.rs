//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Attach a tier gate to every protected route
//! - Wire up middleware (request ID, tracing, metrics, panic recovery,
//!   CORS, timeout, body limit, rate limiting, authentication)
//! - Give every rejection, tower-http's included, the JSON error envelope

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    handler::Handler,
    middleware::{from_fn, from_fn_with_state, map_response},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{
    authenticate, authorize, CredentialStore, Gate, GateState, MemoryCredentialStore,
    MemoryPermissionStore, PermissionStore, Principal, Scope, TokenAuthenticator, TokenError,
    UserStore,
};
use crate::catalog::MovieStore;
use crate::config::{ApiConfig, SeedPrincipal};
use crate::http::error::{envelope_bare_rejections, method_not_allowed, not_found, ApiError};
use crate::http::{handlers, movies, users};
use crate::lifecycle::tasks::panic_message;
use crate::lifecycle::BackgroundTaskRunner;
use crate::notify::{LogNotifier, Notifier};
use crate::observability::metrics::track_metrics;
use crate::security::cors::cors_layer;
use crate::security::rate_limit::{rate_limit, RateLimiter};

/// External collaborators the server calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialStore>,
    pub users: Arc<dyn UserStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<MovieStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// In-process stores provisioned from `seed`. Only token digests are kept.
    pub fn in_memory(seed: &[SeedPrincipal]) -> Result<Self, TokenError> {
        let credentials = MemoryCredentialStore::new();
        let permissions = MemoryPermissionStore::new();

        for entry in seed {
            credentials.upsert_principal(Principal::new(entry.id, entry.activated));
            credentials.register_plaintext(
                &entry.token,
                entry.id,
                Duration::from_secs(entry.ttl_hours.saturating_mul(3600)),
                Scope::Authentication,
            )?;
            permissions.grant(entry.id, entry.permissions.iter().cloned());
            tracing::debug!(
                principal_id = entry.id,
                activated = entry.activated,
                permissions = entry.permissions.len(),
                "Seed principal provisioned"
            );
        }

        let credentials = Arc::new(credentials);
        Ok(Self {
            credentials: credentials.clone(),
            users: credentials,
            permissions: Arc::new(permissions),
            movies: Arc::new(MovieStore::new()),
            notifier: Arc::new(LogNotifier),
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub environment: Arc<str>,
    pub credentials: Arc<dyn CredentialStore>,
    pub users: Arc<dyn UserStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub password_cost: u32,
    pub movies: Arc<MovieStore>,
    pub notifier: Arc<dyn Notifier>,
    pub tasks: BackgroundTaskRunner,
}

/// HTTP server for the catalog API.
pub struct HttpServer {
    routes: Router<AppState>,
    state: AppState,
    config: ApiConfig,
    authenticator: Arc<TokenAuthenticator>,
    limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Background work scheduled by handlers goes to `tasks`.
    pub fn new(config: &ApiConfig, collaborators: Collaborators, tasks: BackgroundTaskRunner) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config.limiter));
        let authenticator = Arc::new(TokenAuthenticator::new(collaborators.credentials.clone()));

        let state = AppState {
            environment: Arc::from(config.listener.environment.as_str()),
            credentials: collaborators.credentials.clone(),
            users: collaborators.users.clone(),
            permissions: collaborators.permissions.clone(),
            password_cost: config.auth.password_cost,
            movies: collaborators.movies.clone(),
            notifier: collaborators.notifier.clone(),
            tasks,
        };

        Self {
            routes: Self::build_routes(&collaborators.permissions),
            state,
            config: config.clone(),
            authenticator,
            limiter,
        }
    }

    /// Routing table with a tier gate on every protected route.
    fn build_routes(permissions: &Arc<dyn PermissionStore>) -> Router<AppState> {
        let read = from_fn_with_state(
            GateState::new(Gate::permission("movies:read"), permissions.clone()),
            authorize,
        );
        let write = from_fn_with_state(
            GateState::new(Gate::permission("movies:write"), permissions.clone()),
            authorize,
        );
        let activated = from_fn_with_state(
            GateState::new(Gate::activated(), permissions.clone()),
            authorize,
        );

        Router::new()
            .route("/v1/healthcheck", get(handlers::healthcheck))
            .route(
                "/v1/movies",
                get(movies::list_movies.layer(read.clone()))
                    .post(movies::create_movie.layer(write.clone())),
            )
            .route(
                "/v1/movies/{id}",
                get(movies::show_movie.layer(read))
                    .patch(movies::update_movie.layer(write.clone()))
                    .delete(movies::delete_movie.layer(write)),
            )
            .route("/v1/me", get(handlers::me.layer(activated)))
            .route("/v1/users", post(users::register_user))
            .route("/v1/users/activated", put(users::activate_user))
            .route(
                "/v1/tokens/authentication",
                post(users::create_authentication_token),
            )
    }

    /// Add routes that get the same middleware stack as the built-in ones.
    pub fn merge(mut self, routes: Router<AppState>) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// The rate limiter shared by every request, for its sweeper.
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Finish the router with fallbacks and all middleware layers.
    ///
    /// Layers are listed innermost first.
    #[allow(deprecated)]
    pub fn into_router(self) -> Router {
        let config = &self.config;

        self.routes
            .fallback(not_found)
            .method_not_allowed_fallback(method_not_allowed)
            .with_state(self.state)
            .layer(from_fn_with_state(self.authenticator, authenticate))
            .layer(from_fn_with_state(self.limiter, rate_limit))
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(map_response(envelope_bare_rejections))
            .layer(cors_layer(&config.cors))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(from_fn(track_metrics))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::HandlerPanicked(panic_message(payload.as_ref())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const WRITER_TOKEN: &str = "WRITERAAAAAAAAAAAAAAAAAAAA";

    fn router() -> Router {
        let seed = vec![SeedPrincipal {
            id: 7,
            activated: true,
            permissions: vec!["movies:read".into(), "movies:write".into()],
            token: WRITER_TOKEN.into(),
            ttl_hours: 1,
        }];
        let config = ApiConfig::default();
        HttpServer::new(&config, Collaborators::in_memory(&seed).unwrap(), BackgroundTaskRunner::new())
            .into_router()
    }

    async fn status_and_body(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn permission_route_rejects_anonymous() {
        let request = Request::get("/v1/movies").body(Body::empty()).unwrap();
        let (status, body) = status_and_body(router(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "you must be authenticated to access this resource");
    }

    #[tokio::test]
    async fn writer_creates_and_lists() {
        let router = router();

        let request = Request::post("/v1/movies")
            .header(header::AUTHORIZATION, format!("Bearer {WRITER_TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":"Arrival","year":2016,"runtime":116}"#))
            .unwrap();
        let (status, body) = status_and_body(router.clone(), request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["movie"]["id"], 1);

        let request = Request::get("/v1/movies?sort=-year")
            .header(header::AUTHORIZATION, format!("Bearer {WRITER_TOKEN}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = status_and_body(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metadata"]["total_records"], 1);
        assert_eq!(body["movies"][0]["title"], "Arrival");
    }

    #[tokio::test]
    async fn patch_bumps_version_and_delete_removes() {
        let router = router();
        let auth = format!("Bearer {WRITER_TOKEN}");

        let create = Request::post("/v1/movies")
            .header(header::AUTHORIZATION, &auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":"Heat"}"#))
            .unwrap();
        assert_eq!(status_and_body(router.clone(), create).await.0, StatusCode::CREATED);

        let patch = || {
            Request::patch("/v1/movies/1")
                .header(header::AUTHORIZATION, &auth)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"year":1995}"#))
                .unwrap()
        };
        let (status, body) = status_and_body(router.clone(), patch()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["movie"]["version"], 2);

        let request = Request::delete("/v1/movies/1")
            .header(header::AUTHORIZATION, &auth)
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_and_body(router.clone(), request).await.0, StatusCode::OK);

        let (status, _) = status_and_body(router, patch()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_peer_address_is_a_server_fault_when_limiting() {
        let mut config = ApiConfig::default();
        config.limiter.enabled = true;
        let router = HttpServer::new(&config, Collaborators::in_memory(&[]).unwrap(), BackgroundTaskRunner::new())
            .into_router();

        // No ConnectInfo: the request did not come through a real listener.
        let request = Request::get("/v1/healthcheck").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[tokio::test]
    async fn oversized_body_answers_enveloped_413() {
        let mut config = ApiConfig::default();
        config.limits.max_body_bytes = 64;
        let router = HttpServer::new(&config, Collaborators::in_memory(&[]).unwrap(), BackgroundTaskRunner::new())
            .into_router();

        let body = format!(r#"{{"title":"{}"}}"#, "x".repeat(256));
        let request = Request::post("/v1/movies")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();
        let (status, body) = status_and_body(router, request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "the request body is too large");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_answers_enveloped_408() {
        let mut config = ApiConfig::default();
        config.timeouts.request_secs = 1;
        let slow: Router<AppState> = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let router = HttpServer::new(&config, Collaborators::in_memory(&[]).unwrap(), BackgroundTaskRunner::new())
            .merge(slow)
            .into_router();

        let request = Request::get("/slow").body(Body::empty()).unwrap();
        let (status, body) = status_and_body(router, request).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["error"], "the request took too long to process");
    }

    #[test]
    fn seed_lifetime_overflow_is_reported() {
        let seed = vec![SeedPrincipal {
            id: 1,
            activated: true,
            permissions: vec![],
            token: WRITER_TOKEN.into(),
            ttl_hours: u64::MAX / 3600,
        }];
        assert!(matches!(
            Collaborators::in_memory(&seed),
            Err(TokenError::LifetimeOutOfRange(_))
        ));
    }
}
