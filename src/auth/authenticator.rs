//! Bearer token authentication.
//!
//! # Responsibilities
//! - Parse the `Authorization` header
//! - Resolve a token to a principal through the credential store
//! - Attach the principal (or the anonymous principal) to the request
//!
//! # Design Decisions
//! - A missing header is not an error; the caller is anonymous
//! - Malformed, unknown and expired tokens are indistinguishable to the client
//! - Store faults are server errors, never authentication failures

use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::principal::Principal;
use crate::auth::store::CredentialStore;
use crate::auth::token::{self, Scope, TokenHash};
use crate::auth::AuthError;
use crate::http::error::ApiError;

/// Resolves bearer credentials to principals.
///
/// Holds no mutable state; share one instance across all requests.
pub struct TokenAuthenticator {
    store: Arc<dyn CredentialStore>,
}

impl TokenAuthenticator {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Resolve a raw `Authorization` header value.
    pub async fn resolve(&self, header: &str) -> Result<Principal, AuthError> {
        self.resolve_at(header, SystemTime::now()).await
    }

    /// Resolve a header value as of `now`.
    pub async fn resolve_at(&self, header: &str, now: SystemTime) -> Result<Principal, AuthError> {
        if header.is_empty() {
            return Ok(Principal::anonymous());
        }

        let plaintext = match header.split(' ').collect::<Vec<_>>().as_slice() {
            ["Bearer", token] => *token,
            _ => return Err(AuthError::InvalidCredentialFormat),
        };

        if !token::validate_plaintext(plaintext) {
            return Err(AuthError::InvalidCredentialFormat);
        }

        let hash = TokenHash::of(plaintext);
        let credential = self
            .store
            .find_by_hash(&hash, Scope::Authentication)
            .await?
            .filter(|c| c.scope == Scope::Authentication && !c.is_expired_at(now))
            .ok_or(AuthError::InvalidCredentialFormat)?;

        self.store
            .principal(credential.principal_id)
            .await?
            .ok_or(AuthError::InvalidCredentialFormat)
    }
}

/// Middleware attaching a [`Principal`] to every request.
pub async fn authenticate(
    State(authenticator): State<Arc<TokenAuthenticator>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map(str::to_owned));

    let outcome = match authorization {
        None => Ok(Principal::anonymous()),
        Some(Ok(value)) => authenticator.resolve(&value).await,
        Some(Err(_)) => Err(AuthError::InvalidCredentialFormat),
    };

    let mut response = match outcome {
        Ok(principal) => {
            tracing::trace!(
                principal_id = principal.id,
                anonymous = principal.is_anonymous(),
                "Request authenticated"
            );
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => ApiError::from(e).into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("authorization"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{MemoryCredentialStore, StoreError};
    use crate::auth::token::{Credential, IssuedToken};
    use async_trait::async_trait;
    use std::time::Duration;

    const TOKEN: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    fn authenticator_with(store: MemoryCredentialStore) -> TokenAuthenticator {
        TokenAuthenticator::new(Arc::new(store))
    }

    async fn issue(store: &MemoryCredentialStore, principal_id: i64, scope: Scope) -> IssuedToken {
        let issued = token::generate(principal_id, Duration::from_secs(60), scope).unwrap();
        store.insert(issued.credential.clone()).await.unwrap();
        issued
    }

    #[tokio::test]
    async fn empty_header_is_anonymous() {
        let auth = authenticator_with(MemoryCredentialStore::new());
        let principal = auth.resolve("").await.unwrap();
        assert!(principal.is_anonymous());
    }

    #[tokio::test]
    async fn malformed_schemes_are_rejected() {
        let auth = authenticator_with(MemoryCredentialStore::new());
        for header in [
            "Basic abc",
            "Bearer",
            "bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            "Bearer  ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            "Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ extra",
            "Bearer short",
        ] {
            assert!(
                matches!(auth.resolve(header).await, Err(AuthError::InvalidCredentialFormat)),
                "{header:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn valid_token_resolves_principal() {
        let store = MemoryCredentialStore::new();
        store.upsert_principal(Principal::new(9, true));
        let issued = issue(&store, 9, Scope::Authentication).await;

        let auth = authenticator_with(store);
        let principal = auth
            .resolve(&format!("Bearer {}", issued.plaintext))
            .await
            .unwrap();
        assert_eq!(principal, Principal::new(9, true));
    }

    #[tokio::test]
    async fn unknown_token_looks_like_malformed() {
        let auth = authenticator_with(MemoryCredentialStore::new());
        let err = auth.resolve(&format!("Bearer {TOKEN}")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentialFormat));
    }

    #[tokio::test]
    async fn expired_token_never_resolves() {
        let store = MemoryCredentialStore::new();
        store.upsert_principal(Principal::new(1, true));
        let now = SystemTime::now();
        store
            .insert(Credential {
                hash: TokenHash::of(TOKEN),
                principal_id: 1,
                expiry: now - Duration::from_secs(1),
                scope: Scope::Authentication,
            })
            .await
            .unwrap();

        let auth = authenticator_with(store);
        let err = auth
            .resolve_at(&format!("Bearer {TOKEN}"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentialFormat));
    }

    #[tokio::test]
    async fn activation_token_does_not_authenticate() {
        let store = MemoryCredentialStore::new();
        store.upsert_principal(Principal::new(1, false));
        let issued = issue(&store, 1, Scope::Activation).await;

        let auth = authenticator_with(store);
        let err = auth
            .resolve(&format!("Bearer {}", issued.plaintext))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentialFormat));
    }

    struct FailingStore;

    #[async_trait]
    impl CredentialStore for FailingStore {
        async fn find_by_hash(
            &self,
            _hash: &TokenHash,
            _scope: Scope,
        ) -> Result<Option<Credential>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn principal(&self, _id: i64) -> Result<Option<Principal>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn insert(&self, _credential: Credential) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn revoke_all_for(&self, _scope: Scope, _id: i64) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn purge_expired(&self, _now: SystemTime) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn store_faults_are_lookup_failures() {
        let auth = TokenAuthenticator::new(Arc::new(FailingStore));
        let err = auth.resolve(&format!("Bearer {TOKEN}")).await.unwrap_err();
        assert!(matches!(err, AuthError::LookupFailed(_)));
    }
}
