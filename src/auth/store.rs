//! Credential, permission and account collaborators.
//!
//! The gatekeeping pipeline only talks to the traits. The in-memory
//! implementations back the binary and the tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::auth::principal::{Permissions, Principal};
use crate::auth::token::{self, Credential, Scope, TokenError, TokenHash};
use crate::auth::users::{NewUser, User, UserError, UserStore};
use crate::lifecycle::Shutdown;

/// A fault inside a storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage query failed: {0}")]
    Query(String),
}

/// Looks up credentials by digest and the principals they belong to.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the credential with this digest and scope. Expired records may be
    /// returned; callers decide validity.
    async fn find_by_hash(
        &self,
        hash: &TokenHash,
        scope: Scope,
    ) -> Result<Option<Credential>, StoreError>;

    /// Load the principal a credential refers to.
    async fn principal(&self, id: i64) -> Result<Option<Principal>, StoreError>;

    async fn insert(&self, credential: Credential) -> Result<(), StoreError>;

    /// Delete every credential of `scope` held by a principal.
    async fn revoke_all_for(&self, scope: Scope, principal_id: i64) -> Result<usize, StoreError>;

    /// Delete every credential expired at `now`.
    async fn purge_expired(&self, now: SystemTime) -> Result<usize, StoreError>;
}

/// Resolves the permission codes granted to a principal.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permissions_for(&self, principal_id: i64) -> Result<Permissions, StoreError>;

    async fn add_for_principal(&self, principal_id: i64, codes: &[&str]) -> Result<(), StoreError>;
}

/// Purge expired credentials every `every` until shutdown is triggered.
pub async fn purge_expired_credentials(
    store: Arc<dyn CredentialStore>,
    every: Duration,
    shutdown: Shutdown,
) -> Result<(), StoreError> {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.wait() => return Ok(()),
            _ = interval.tick() => {
                let purged = store.purge_expired(SystemTime::now()).await?;
                if purged > 0 {
                    tracing::debug!(purged, "Expired credentials purged");
                }
            }
        }
    }
}

/// Thread-safe in-memory store of principals, user accounts and credentials.
#[derive(Clone)]
pub struct MemoryCredentialStore {
    credentials: Arc<DashMap<(TokenHash, Scope), Credential>>,
    principals: Arc<DashMap<i64, Principal>>,
    users: Arc<DashMap<i64, User>>,
    emails: Arc<DashMap<String, i64>>,
    next_id: Arc<AtomicI64>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self {
            credentials: Arc::default(),
            principals: Arc::default(),
            users: Arc::default(),
            emails: Arc::default(),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a principal. Registered accounts never reuse its id.
    pub fn upsert_principal(&self, principal: Principal) {
        self.next_id.fetch_max(principal.id + 1, Ordering::Relaxed);
        self.principals.insert(principal.id, principal);
    }

    /// Register a credential for an operator-supplied plaintext.
    pub fn register_plaintext(
        &self,
        plaintext: &str,
        principal_id: i64,
        ttl: Duration,
        scope: Scope,
    ) -> Result<(), TokenError> {
        let credential = Credential {
            hash: TokenHash::of(plaintext),
            principal_id,
            expiry: token::expiry_after(ttl)?,
            scope,
        };
        self.credentials
            .insert((credential.hash, credential.scope), credential);
        Ok(())
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_hash(
        &self,
        hash: &TokenHash,
        scope: Scope,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.get(&(*hash, scope)).map(|r| r.value().clone()))
    }

    async fn principal(&self, id: i64) -> Result<Option<Principal>, StoreError> {
        Ok(self.principals.get(&id).map(|r| r.value().clone()))
    }

    async fn insert(&self, credential: Credential) -> Result<(), StoreError> {
        tracing::debug!(
            principal_id = credential.principal_id,
            scope = %credential.scope,
            "Credential stored"
        );
        self.credentials
            .insert((credential.hash, credential.scope), credential);
        Ok(())
    }

    async fn revoke_all_for(&self, scope: Scope, principal_id: i64) -> Result<usize, StoreError> {
        let before = self.credentials.len();
        self.credentials
            .retain(|_, c| !(c.scope == scope && c.principal_id == principal_id));
        Ok(before - self.credentials.len())
    }

    async fn purge_expired(&self, now: SystemTime) -> Result<usize, StoreError> {
        let before = self.credentials.len();
        self.credentials.retain(|_, c| !c.is_expired_at(now));
        Ok(before - self.credentials.len())
    }
}

#[async_trait]
impl UserStore for MemoryCredentialStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, UserError> {
        let id = match self.emails.entry(new.email.clone()) {
            Entry::Occupied(_) => return Err(UserError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert(id);
                id
            }
        };

        let user = User {
            id,
            created_at: SystemTime::now(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            activated: false,
            version: 1,
        };
        self.principals.insert(id, Principal::new(id, false));
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .emails
            .get(email)
            .and_then(|id| self.users.get(id.value()).map(|u| u.value().clone())))
    }

    async fn activate_user(&self, id: i64) -> Result<User, UserError> {
        let mut user = self.users.get_mut(&id).ok_or(UserError::NotFound)?;
        user.activated = true;
        user.version += 1;
        self.principals.insert(id, Principal::new(id, true));
        Ok(user.clone())
    }
}

/// Thread-safe in-memory permission store.
#[derive(Clone, Default)]
pub struct MemoryPermissionStore {
    grants: Arc<DashMap<i64, Permissions>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add permission codes to a principal.
    pub fn grant<I, S>(&self, principal_id: i64, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants.entry(principal_id).or_default().extend(codes);
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn permissions_for(&self, principal_id: i64) -> Result<Permissions, StoreError> {
        Ok(self
            .grants
            .get(&principal_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn add_for_principal(&self, principal_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        self.grant(principal_id, codes.iter().copied());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::IssuedToken;

    async fn issue(store: &MemoryCredentialStore, id: i64, ttl_secs: u64, scope: Scope) -> IssuedToken {
        let issued = token::generate(id, Duration::from_secs(ttl_secs), scope).unwrap();
        store.insert(issued.credential.clone()).await.unwrap();
        issued
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Alice".into(),
            email: email.into(),
            password_hash: "$2b$04$not-a-real-hash".into(),
        }
    }

    #[tokio::test]
    async fn scopes_do_not_cross() {
        let store = MemoryCredentialStore::new();
        let issued = issue(&store, 1, 60, Scope::Activation).await;

        let hash = issued.credential.hash;
        assert!(store
            .find_by_hash(&hash, Scope::Authentication)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_hash(&hash, Scope::Activation)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn revoke_removes_only_matching_scope() {
        let store = MemoryCredentialStore::new();
        issue(&store, 1, 60, Scope::Authentication).await;
        issue(&store, 1, 60, Scope::Authentication).await;
        issue(&store, 1, 60, Scope::Activation).await;
        issue(&store, 2, 60, Scope::Authentication).await;

        assert_eq!(store.revoke_all_for(Scope::Authentication, 1).await.unwrap(), 2);
        assert_eq!(store.credential_count(), 2);
    }

    #[tokio::test]
    async fn purge_drops_expired() {
        let store = MemoryCredentialStore::new();
        issue(&store, 1, 60, Scope::Authentication).await;
        issue(&store, 2, 3600, Scope::Authentication).await;

        let later = SystemTime::now() + Duration::from_secs(120);
        assert_eq!(store.purge_expired(later).await.unwrap(), 1);
        assert_eq!(store.credential_count(), 1);
    }

    #[test]
    fn oversized_seed_lifetime_is_an_error() {
        let store = MemoryCredentialStore::new();
        let err = store
            .register_plaintext(
                "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
                1,
                Duration::from_secs(u64::MAX),
                Scope::Authentication,
            )
            .unwrap_err();
        assert!(matches!(err, TokenError::LifetimeOutOfRange(_)));
        assert_eq!(store.credential_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_loop_runs_until_shutdown() {
        let store = MemoryCredentialStore::new();
        store
            .insert(Credential {
                hash: TokenHash::of("ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
                principal_id: 1,
                expiry: SystemTime::UNIX_EPOCH,
                scope: Scope::Authentication,
            })
            .await
            .unwrap();

        let shutdown = Shutdown::new();
        let purger = tokio::spawn(purge_expired_credentials(
            Arc::new(store.clone()),
            Duration::from_secs(60),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.credential_count(), 0);

        shutdown.trigger();
        purger.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn registered_users_get_fresh_ids_and_unique_emails() {
        let store = MemoryCredentialStore::new();
        store.upsert_principal(Principal::new(4, true));

        let user = store.insert_user(new_user("alice@example.com")).await.unwrap();
        assert_eq!(user.id, 5);
        assert!(!user.activated);
        assert_eq!(store.principal(5).await.unwrap(), Some(Principal::new(5, false)));

        let err = store.insert_user(new_user("alice@example.com")).await.unwrap_err();
        assert!(matches!(err, UserError::DuplicateEmail));
    }

    #[tokio::test]
    async fn activation_updates_the_principal() {
        let store = MemoryCredentialStore::new();
        let user = store.insert_user(new_user("bob@example.com")).await.unwrap();

        let activated = store.activate_user(user.id).await.unwrap();
        assert!(activated.activated);
        assert_eq!(activated.version, 2);
        assert_eq!(
            store.principal(user.id).await.unwrap(),
            Some(Principal::new(user.id, true))
        );
        assert!(matches!(store.activate_user(99).await, Err(UserError::NotFound)));
    }

    #[tokio::test]
    async fn grants_accumulate() {
        let store = MemoryPermissionStore::new();
        store.grant(5, ["movies:read"]);
        store.add_for_principal(5, &["movies:write"]).await.unwrap();

        let perms = store.permissions_for(5).await.unwrap();
        assert!(perms.includes("movies:read"));
        assert!(perms.includes("movies:write"));
        assert!(store.permissions_for(6).await.unwrap().is_empty());
    }
}
