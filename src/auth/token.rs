//! Bearer credentials.
//!
//! A token is 16 random bytes rendered as unpadded base-32, which is always
//! 26 characters. Only the SHA-256 digest of the plaintext is ever stored.

use std::fmt;
use std::time::{Duration, SystemTime};

use data_encoding::BASE32_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a plaintext token.
pub const TOKEN_LENGTH: usize = 26;

const TOKEN_ENTROPY_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token lifetime of {0:?} is out of range")]
    LifetimeOutOfRange(Duration),
}

/// What a credential may be used for. Scopes never substitute for each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 digest of a plaintext token.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    /// Digest arbitrary bytes.
    pub fn digest(bytes: impl AsRef<[u8]>) -> Self {
        Self(Sha256::digest(bytes.as_ref()).into())
    }

    /// Digest a plaintext token.
    pub fn of(plaintext: &str) -> Self {
        Self::digest(plaintext.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// Only a prefix, so logs never carry a full lookup key.
impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…)")
    }
}

/// A stored credential. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub hash: TokenHash,
    pub principal_id: i64,
    pub expiry: SystemTime,
    pub scope: Scope,
}

impl Credential {
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiry <= now
    }
}

/// A freshly issued credential together with the plaintext handed to the client.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub plaintext: String,
    pub credential: Credential,
}

/// The instant a credential issued now with lifetime `ttl` expires.
pub fn expiry_after(ttl: Duration) -> Result<SystemTime, TokenError> {
    SystemTime::now()
        .checked_add(ttl)
        .ok_or(TokenError::LifetimeOutOfRange(ttl))
}

/// Generate a new random token for a principal.
pub fn generate(principal_id: i64, ttl: Duration, scope: Scope) -> Result<IssuedToken, TokenError> {
    let expiry = expiry_after(ttl)?;

    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = BASE32_NOPAD.encode(&bytes);

    Ok(IssuedToken {
        credential: Credential {
            hash: TokenHash::of(&plaintext),
            principal_id,
            expiry,
            scope,
        },
        plaintext,
    })
}

/// Check a plaintext token's length and alphabet before any lookup.
pub fn validate_plaintext(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_LENGTH
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}
