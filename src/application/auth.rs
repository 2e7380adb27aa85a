//! Request-scoped authentication state produced by the auth gate.

use crate::domain::entities::UserId;

/// Whether the current request carries a valid signed-in session.
///
/// Derived once per request from the session, read-only afterwards and never
/// persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthContext {
    user_id: Option<UserId>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn authenticated(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }
}
