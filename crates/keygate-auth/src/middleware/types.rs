//! Authentication context types.

use std::sync::Arc;

use crate::token::jwt::AccessTokenClaims;
use crate::types::{ROLE_ADMIN, satisfies_role};

// =============================================================================
// Auth Context
// =============================================================================

/// Authenticated request context.
///
/// Produced by the [`BearerAuth`](super::BearerAuth) extractor or the guard
/// middleware from validated access credential claims.
///
/// The `token_claims` field is wrapped in `Arc` to allow cheap cloning
/// when caching or passing across async boundaries.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Validated access token claims (wrapped in Arc for cheap cloning).
    pub token_claims: Arc<AccessTokenClaims>,
}

impl AuthContext {
    #[must_use]
    pub fn new(claims: AccessTokenClaims) -> Self {
        Self {
            token_claims: Arc::new(claims),
        }
    }

    /// Returns the subject (username).
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.token_claims.sub
    }

    /// Roles carried by the credential.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.token_claims.roles
    }

    /// Returns `true` if the credential grants `role`, honouring
    /// `ROLE_ADMIN > ROLE_USER`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        satisfies_role(&self.token_claims.roles, role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    /// Returns the token's unique identifier.
    #[must_use]
    pub fn jti(&self) -> &str {
        &self.token_claims.jti
    }

    #[must_use]
    pub fn claims(&self) -> &AccessTokenClaims {
        &self.token_claims
    }
}

// =============================================================================
// Tests
// =============================================================================
