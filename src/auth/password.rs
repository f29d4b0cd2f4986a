//! Password hashing.
//!
//! bcrypt is CPU-bound, so both operations run on the blocking pool.

use thiserror::Error;

/// bcrypt cost used when none is configured.
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// bcrypt ignores input past 72 bytes.
pub const MAX_PASSWORD_LENGTH: usize = 72;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

pub async fn hash_password(plaintext: &str, cost: u32) -> Result<String, PasswordError> {
    let plaintext = plaintext.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
        .await
        .map_err(|e| PasswordError::Hashing(format!("task join error: {e}")))?
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// `Ok(false)` on a mismatch; errors only for unusable hashes.
pub async fn verify_password(plaintext: &str, hash: &str) -> Result<bool, PasswordError> {
    let plaintext = plaintext.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash))
        .await
        .map_err(|e| PasswordError::Hashing(format!("task join error: {e}")))?
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}
