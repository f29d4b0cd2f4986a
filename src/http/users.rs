//! Account registration, activation and token issuance.
//!
//! These routes are open: they are how a caller gets a credential in the
//! first place.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::{self, Scope, TokenHash};
use crate::auth::users::{validate_email, validate_password, validate_registration, validate_token_plaintext};
use crate::auth::{NewUser, UserError};
use crate::http::error::ApiError;
use crate::http::movies::json_body;
use crate::http::server::AppState;

/// Lifetime of the token mailed on registration.
pub const ACTIVATION_TTL: Duration = Duration::from_secs(3 * 24 * 3600);

/// Lifetime of a bearer token issued for email and password.
pub const AUTHENTICATION_TTL: Duration = Duration::from_secs(24 * 3600);

/// Permission every new account starts with.
const DEFAULT_PERMISSION: &str = "movies:read";

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateInput {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

pub async fn register_user(
    State(state): State<AppState>,
    body: Result<Json<RegisterInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(body)?;

    let errors = validate_registration(&input.name, &input.email, &input.password);
    if !errors.is_empty() {
        return Err(ApiError::FailedValidation(errors));
    }

    let password_hash = hash_password(&input.password, state.password_cost).await?;
    let user = state
        .users
        .insert_user(NewUser {
            name: input.name,
            email: input.email,
            password_hash,
        })
        .await?;

    state
        .permissions
        .add_for_principal(user.id, &[DEFAULT_PERMISSION])
        .await?;

    let issued = token::generate(user.id, ACTIVATION_TTL, Scope::Activation)?;
    state.credentials.insert(issued.credential.clone()).await?;

    tracing::info!(user_id = user.id, "User registered");

    let notifier = state.notifier.clone();
    let recipient = user.email.clone();
    let payload = json!({ "activationToken": issued.plaintext, "userID": user.id });
    state.tasks.run("user_welcome_email", async move {
        notifier.send(&recipient, "user_welcome", payload).await
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))).into_response())
}

pub async fn activate_user(
    State(state): State<AppState>,
    body: Result<Json<ActivateInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(body)?;

    let mut errors = BTreeMap::new();
    validate_token_plaintext(&input.token, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::FailedValidation(errors));
    }

    let invalid_token = || {
        let mut fields = BTreeMap::new();
        fields.insert("token".to_string(), "invalid or expired activation token".to_string());
        ApiError::FailedValidation(fields)
    };

    let credential = state
        .credentials
        .find_by_hash(&TokenHash::of(&input.token), Scope::Activation)
        .await?
        .filter(|c| !c.is_expired_at(SystemTime::now()))
        .ok_or_else(invalid_token)?;

    let user = match state.users.activate_user(credential.principal_id).await {
        Ok(user) => user,
        Err(UserError::NotFound) => return Err(invalid_token()),
        Err(e) => return Err(e.into()),
    };

    let revoked = state
        .credentials
        .revoke_all_for(Scope::Activation, user.id)
        .await?;
    tracing::info!(user_id = user.id, revoked, "User activated");

    Ok(Json(json!({ "user": user })).into_response())
}

pub async fn create_authentication_token(
    State(state): State<AppState>,
    body: Result<Json<CredentialsInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(body)?;

    let mut errors = BTreeMap::new();
    validate_email(&input.email, &mut errors);
    validate_password(&input.password, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::FailedValidation(errors));
    }

    let user = state
        .users
        .user_by_email(&input.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&input.password, &user.password_hash).await? {
        return Err(ApiError::InvalidCredentials);
    }

    let issued = token::generate(user.id, AUTHENTICATION_TTL, Scope::Authentication)?;
    state.credentials.insert(issued.credential.clone()).await?;

    let body = AuthenticationToken {
        token: issued.plaintext,
        expiry: DateTime::<Utc>::from(issued.credential.expiry),
    };
    Ok((StatusCode::CREATED, Json(json!({ "authentication_token": body }))).into_response())
}
