//! Role authorization
//!
//! Roles are data: a map from role name to a predicate over the session.
//! Grants are never cached, so every check sees the current session.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::auth::session::Session;

/// The role granted to any authenticated user
pub const USER_ROLE: &str = "User";

/// Predicate deciding whether a session holds a role
pub type RolePredicate = Arc<dyn Fn(&Session) -> bool + Send + Sync>;

/// Mapping from role name to predicate
#[derive(Clone)]
pub struct RoleRegistry {
    roles: BTreeMap<String, RolePredicate>,
}

impl RoleRegistry {
    /// An empty registry: every check is denied
    pub fn empty() -> Self {
        Self {
            roles: BTreeMap::new(),
        }
    }

    /// Add or replace a role
    pub fn with_role<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Session) -> bool + Send + Sync + 'static,
    {
        self.roles.insert(name.into(), Arc::new(predicate));
        self
    }

    /// Whether `session` holds `role`. Absent sessions and unknown roles are denied.
    pub fn authorize(&self, session: Option<&Session>, role: &str) -> bool {
        match (session, self.roles.get(role)) {
            (Some(session), Some(predicate)) => predicate(session),
            _ => false,
        }
    }

    /// All roles currently granted to `session`
    pub fn granted(&self, session: Option<&Session>) -> Vec<&str> {
        self.roles
            .keys()
            .filter(|name| self.authorize(session, name))
            .map(String::as_str)
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::empty().with_role(USER_ROLE, |session| !session.email.is_empty())
    }
}

impl fmt::Debug for RoleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleRegistry")
            .field("roles", &self.roles.keys().collect::<Vec<_>>())
            .finish()
    }
}
