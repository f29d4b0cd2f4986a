//! Request-scoped identity.

use std::collections::HashSet;

use serde::Serialize;

/// The identity attached to a request after authentication.
///
/// Inserted into request extensions by the authentication middleware and
/// read by the tier gates and handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub activated: bool,
    #[serde(skip)]
    anonymous: bool,
}

/// The caller that presented no credential.
pub const ANONYMOUS: Principal = Principal {
    id: 0,
    activated: false,
    anonymous: true,
};

impl Principal {
    pub fn new(id: i64, activated: bool) -> Self {
        Self {
            id,
            activated,
            anonymous: false,
        }
    }

    pub fn anonymous() -> Self {
        ANONYMOUS
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

/// Permission codes held by a principal, e.g. `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(HashSet<String>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn insert(&mut self, code: impl Into<String>) {
        self.0.insert(code.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for Permissions {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}
