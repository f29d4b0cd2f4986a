use axum::{extract::State, Extension, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::Principal;
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub system_info: SystemInfo,
}

pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "available",
        system_info: SystemInfo {
            environment: state.environment.to_string(),
            version: env!("CARGO_PKG_VERSION"),
        },
    })
}

/// The caller's own identity. Gated on activation only.
pub async fn me(Extension(principal): Extension<Principal>) -> Json<Value> {
    Json(json!({ "user": principal }))
}
