//! Authentication and authorization subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>
//!     → authenticator.rs (format check, digest, credential lookup)
//!     → Principal attached to request extensions
//!     → gate.rs (Authenticated → Activated → Permission tiers, per route)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Only token digests are stored (token.rs)
//! - Stores are traits; in-memory implementations live in store.rs
//! - Passwords are bcrypt-hashed on the blocking pool (password.rs)
//! - Gates are immutable values built once at routing-table setup

pub mod authenticator;
pub mod gate;
pub mod password;
pub mod principal;
pub mod store;
pub mod token;
pub mod users;

use thiserror::Error;

pub use authenticator::{authenticate, TokenAuthenticator};
pub use gate::{authorize, Decision, Gate, GateState, Tier};
pub use principal::{Permissions, Principal, ANONYMOUS};
pub use store::{
    purge_expired_credentials, CredentialStore, MemoryCredentialStore, MemoryPermissionStore,
    PermissionStore, StoreError,
};
pub use token::{Credential, IssuedToken, Scope, TokenError, TokenHash};
pub use users::{NewUser, User, UserError, UserStore};

/// Why a caller was not let through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Malformed header, unknown token or expired token.
    #[error("invalid or missing authentication token")]
    InvalidCredentialFormat,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    AccountInactive,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    PermissionDenied,

    /// A collaborator failed; a server fault, not a rejection.
    #[error("credential lookup failed: {0}")]
    LookupFailed(#[from] StoreError),
}

impl AuthError {
    /// Metric label for gate rejections; `None` for server faults.
    pub fn rejection_label(&self) -> Option<&'static str> {
        match self {
            AuthError::InvalidCredentialFormat => Some("invalid_credential"),
            AuthError::AuthenticationRequired => Some("authentication_required"),
            AuthError::AccountInactive => Some("account_inactive"),
            AuthError::PermissionDenied => Some("permission_denied"),
            AuthError::LookupFailed(_) => None,
        }
    }
}
