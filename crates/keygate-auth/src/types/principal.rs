//! Authenticated identity and the role hierarchy.

use serde::{Deserialize, Serialize};

/// Role granted to every registered user.
pub const ROLE_USER: &str = "ROLE_USER";

/// Administrative role. Implies [`ROLE_USER`].
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

/// An authenticated identity as reported by an authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Login name; becomes the `sub` claim.
    pub username: String,

    /// Granted roles as stored, without hierarchy expansion.
    pub roles: Vec<String>,
}

impl Principal {
    /// Creates a principal.
    #[must_use]
    pub fn new(username: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            username: username.into(),
            roles,
        }
    }

    /// Returns `true` if the principal holds `role` directly or through the
    /// hierarchy.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        satisfies_role(&self.roles, role)
    }

    /// Returns `true` for administrators.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ROLE_ADMIN)
    }
}

/// Checks `required` against `held`, applying `ROLE_ADMIN > ROLE_USER`.
#[must_use]
pub fn satisfies_role(held: &[String], required: &str) -> bool {
    held.iter()
        .any(|role| role == required || (role == ROLE_ADMIN && required == ROLE_USER))
}
