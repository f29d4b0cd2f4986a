//! User accounts behind principals.
//!
//! A registered user starts inactive with an activation credential mailed
//! to them. Only the bcrypt hash of the password is kept.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::auth::password::{MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
use crate::auth::store::StoreError;
use crate::auth::token;

static EMAIL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn email_pattern() -> &'static Regex {
    EMAIL_PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email pattern is a valid regex")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("a user with this email address already exists")]
    DuplicateEmail,

    #[error("user not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(skip)]
    pub created_at: SystemTime,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// An account about to be registered.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Register an inactive account. Emails are unique.
    async fn insert_user(&self, user: NewUser) -> Result<User, UserError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn activate_user(&self, id: i64) -> Result<User, UserError>;
}

pub fn validate_email(email: &str, errors: &mut BTreeMap<String, String>) {
    if email.is_empty() {
        errors.insert("email".into(), "must be provided".into());
    } else if !email_pattern().is_match(email) {
        errors.insert("email".into(), "must be a valid email address".into());
    }
}

pub fn validate_password(password: &str, errors: &mut BTreeMap<String, String>) {
    if password.is_empty() {
        errors.insert("password".into(), "must be provided".into());
    } else if password.len() < MIN_PASSWORD_LENGTH {
        errors.insert("password".into(), "must be at least 8 bytes long".into());
    } else if password.len() > MAX_PASSWORD_LENGTH {
        errors.insert("password".into(), "must be at most 72 bytes long".into());
    }
}

pub fn validate_registration(name: &str, email: &str, password: &str) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();
    if name.is_empty() {
        errors.insert("name".into(), "must be provided".into());
    } else if name.len() > 500 {
        errors.insert("name".into(), "must not be more than 500 bytes long".into());
    }
    validate_email(email, &mut errors);
    validate_password(password, &mut errors);
    errors
}

pub fn validate_token_plaintext(plaintext: &str, errors: &mut BTreeMap<String, String>) {
    if plaintext.is_empty() {
        errors.insert("token".into(), "must be provided".into());
    } else if !token::validate_plaintext(plaintext) {
        errors.insert("token".into(), "must be 26 bytes long".into());
    }
}
