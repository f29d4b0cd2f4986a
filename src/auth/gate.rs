//! Tiered authorization gates.
//!
//! A gate is an ordered list of tiers. Tiers are evaluated in order and the
//! first rejection wins, so an anonymous caller always learns only that it
//! must authenticate, whatever the route requires beyond that.
//!
//! ```text
//! Authenticated → Activated → Permission(code) → handler
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::principal::Principal;
use crate::auth::store::{PermissionStore, StoreError};
use crate::auth::AuthError;
use crate::http::error::ApiError;
use crate::observability::metrics;

/// One authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tier {
    /// The caller presented a valid credential.
    Authenticated,
    /// The caller's account is activated.
    Activated,
    /// The caller holds this permission code.
    Permission(Cow<'static, str>),
}

/// Outcome of a single tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject(AuthError),
}

impl Tier {
    pub async fn decide(
        &self,
        principal: &Principal,
        permissions: &dyn PermissionStore,
    ) -> Result<Decision, StoreError> {
        let decision = match self {
            Tier::Authenticated if principal.is_anonymous() => {
                Decision::Reject(AuthError::AuthenticationRequired)
            }
            Tier::Activated if !principal.activated => Decision::Reject(AuthError::AccountInactive),
            Tier::Permission(code) => {
                if permissions.permissions_for(principal.id).await?.includes(code) {
                    Decision::Allow
                } else {
                    Decision::Reject(AuthError::PermissionDenied)
                }
            }
            _ => Decision::Allow,
        };
        Ok(decision)
    }
}

/// An ordered chain of tiers. Immutable and cheap to clone.
#[derive(Debug, Clone)]
pub struct Gate {
    tiers: Arc<[Tier]>,
}

impl Gate {
    /// Any authenticated principal.
    pub fn authenticated() -> Self {
        Self::from_tiers(vec![Tier::Authenticated])
    }

    /// Any authenticated, activated principal.
    pub fn activated() -> Self {
        Self::from_tiers(vec![Tier::Authenticated, Tier::Activated])
    }

    /// An authenticated, activated principal holding `code`.
    pub fn permission(code: impl Into<Cow<'static, str>>) -> Self {
        Self::from_tiers(vec![
            Tier::Authenticated,
            Tier::Activated,
            Tier::Permission(code.into()),
        ])
    }

    fn from_tiers(tiers: Vec<Tier>) -> Self {
        Self {
            tiers: tiers.into(),
        }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Run every tier in order, stopping at the first rejection.
    pub async fn evaluate(
        &self,
        principal: &Principal,
        permissions: &dyn PermissionStore,
    ) -> Result<(), AuthError> {
        for tier in self.tiers.iter() {
            if let Decision::Reject(reason) = tier.decide(principal, permissions).await? {
                return Err(reason);
            }
        }
        Ok(())
    }
}

/// State for [`authorize`]: a gate and where to find permissions.
#[derive(Clone)]
pub struct GateState {
    pub gate: Gate,
    pub permissions: Arc<dyn PermissionStore>,
}

impl GateState {
    pub fn new(gate: Gate, permissions: Arc<dyn PermissionStore>) -> Self {
        Self { gate, permissions }
    }
}

/// Middleware enforcing a gate on the wrapped handler.
///
/// A request without a principal is treated as anonymous.
pub async fn authorize(
    State(state): State<GateState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or_else(Principal::anonymous);

    match state.gate.evaluate(&principal, state.permissions.as_ref()).await {
        Ok(()) => next.run(request).await,
        Err(reason) => {
            if let Some(label) = reason.rejection_label() {
                metrics::record_gate_rejection(label);
            }
            ApiError::from(reason).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryPermissionStore;
    use async_trait::async_trait;

    use crate::auth::principal::Permissions;

    fn store_with(id: i64, codes: &[&str]) -> MemoryPermissionStore {
        let store = MemoryPermissionStore::new();
        store.grant(id, codes.iter().copied());
        store
    }

    #[test]
    fn tiers_are_ordered() {
        assert_eq!(
            Gate::permission("movies:read").tiers(),
            &[
                Tier::Authenticated,
                Tier::Activated,
                Tier::Permission("movies:read".into())
            ]
        );
    }

    #[tokio::test]
    async fn anonymous_always_gets_authentication_required() {
        let store = store_with(0, &["movies:read", "movies:write"]);
        let anon = Principal::anonymous();
        for gate in [
            Gate::authenticated(),
            Gate::activated(),
            Gate::permission("movies:read"),
            Gate::permission("movies:write"),
            Gate::permission("anything:else"),
        ] {
            assert_eq!(
                gate.evaluate(&anon, &store).await,
                Err(AuthError::AuthenticationRequired)
            );
        }
    }

    #[tokio::test]
    async fn inactive_account_is_rejected_before_permissions() {
        let store = store_with(1, &[]);
        let user = Principal::new(1, false);
        assert_eq!(
            Gate::permission("movies:write").evaluate(&user, &store).await,
            Err(AuthError::AccountInactive)
        );
        assert_eq!(Gate::authenticated().evaluate(&user, &store).await, Ok(()));
    }

    #[tokio::test]
    async fn permission_code_is_required() {
        let user = Principal::new(2, true);

        let reader = store_with(2, &["movies:read"]);
        assert_eq!(
            Gate::permission("movies:write").evaluate(&user, &reader).await,
            Err(AuthError::PermissionDenied)
        );

        let writer = store_with(2, &["movies:read", "movies:write"]);
        assert_eq!(
            Gate::permission("movies:write").evaluate(&user, &writer).await,
            Ok(())
        );
    }

    struct BrokenPermissions;

    #[async_trait]
    impl PermissionStore for BrokenPermissions {
        async fn permissions_for(&self, _principal_id: i64) -> Result<Permissions, StoreError> {
            Err(StoreError::Query("timeout".into()))
        }

        async fn add_for_principal(&self, _principal_id: i64, _codes: &[&str]) -> Result<(), StoreError> {
            Err(StoreError::Query("timeout".into()))
        }
    }

    #[tokio::test]
    async fn permission_lookup_fault_is_not_a_denial() {
        let user = Principal::new(3, true);
        let result = Gate::permission("movies:read")
            .evaluate(&user, &BrokenPermissions)
            .await;
        assert!(matches!(result, Err(AuthError::LookupFailed(_))));
    }

    #[tokio::test]
    async fn lower_gates_skip_the_permission_store() {
        let user = Principal::new(3, true);
        assert_eq!(Gate::activated().evaluate(&user, &BrokenPermissions).await, Ok(()));
    }
}
