//! Cross-origin request handling.
//!
//! Only exactly-matching trusted origins are echoed back. Preflight requests
//! are answered directly and never reach the rate limiter. That includes
//! preflights from untrusted origins: they get a 200 without
//! `Access-Control-Allow-Origin`, so the browser refuses the real request,
//! rather than being routed on to a 405.

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::CorsConfig;

/// Build the CORS layer for the configured trusted origins.
///
/// Origins that are not valid header values are skipped; validation reports
/// them before this point.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .trusted_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::GET,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
