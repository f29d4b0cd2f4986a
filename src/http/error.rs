//! Request-level errors and their HTTP responses.
//!
//! Every rejection and fault a request can meet ends up here. The body is
//! always `{"error": <message or field map>}`. Server-side faults are logged
//! with their source and answered with a generic message on a connection
//! that will not be reused.

use std::collections::BTreeMap;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::password::PasswordError;
use crate::auth::{AuthError, StoreError, TokenError, UserError};
use crate::catalog::CatalogError;

const INTERNAL_MESSAGE: &str = "the server encountered a problem and could not process your request";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid or missing authentication token")]
    InvalidCredentialFormat,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    AccountInactive,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    PermissionDenied,

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("lookup failed: {0}")]
    LookupFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("malformed client address: {0}")]
    MalformedClientAddress(String),

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the method is not supported for this resource")]
    MethodNotAllowed,

    #[error("{0}")]
    BadRequest(String),

    #[error("the request took too long to process")]
    RequestTimeout,

    #[error("the request body is too large")]
    PayloadTooLarge,

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("request failed validation")]
    FailedValidation(BTreeMap<String, String>),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidCredentialFormat
            | ApiError::AuthenticationRequired
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AccountInactive | ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::LookupFailed(_)
            | ApiError::Internal(_)
            | ApiError::MalformedClientAddress(_)
            | ApiError::HandlerPanicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status().is_server_error()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::FailedValidation(fields) => json!({ "error": fields }),
            _ if self.is_internal() => json!({ "error": INTERNAL_MESSAGE }),
            other => json!({ "error": other.to_string() }),
        };

        if self.is_internal() {
            tracing::error!(error = %self, "Request failed with server error");
        } else {
            tracing::debug!(status = status.as_u16(), reason = %self, "Request rejected");
        }

        let mut response = (status, Json(body)).into_response();
        if self.is_internal() {
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        if matches!(self, ApiError::InvalidCredentialFormat) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentialFormat => ApiError::InvalidCredentialFormat,
            AuthError::AuthenticationRequired => ApiError::AuthenticationRequired,
            AuthError::AccountInactive => ApiError::AccountInactive,
            AuthError::PermissionDenied => ApiError::PermissionDenied,
            AuthError::LookupFailed(source) => ApiError::LookupFailed(source.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::LookupFailed(err.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound => ApiError::NotFound,
            CatalogError::EditConflict => ApiError::EditConflict,
            other => ApiError::LookupFailed(other.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::DuplicateEmail => {
                let mut fields = BTreeMap::new();
                fields.insert("email".to_string(), UserError::DuplicateEmail.to_string());
                ApiError::FailedValidation(fields)
            }
            UserError::NotFound => ApiError::NotFound,
            UserError::Store(source) => ApiError::from(source),
        }
    }
}

/// Response mapper giving tower-http's plain-text rejections the JSON envelope.
pub async fn envelope_bare_rejections(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|value| value.as_bytes().starts_with(b"application/json"));
    if is_json {
        return response;
    }

    match response.status() {
        StatusCode::REQUEST_TIMEOUT => ApiError::RequestTimeout.into_response(),
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge.into_response(),
        _ => response,
    }
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Fallback for matched routes with an unsupported method.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
