//! Route authorization as an explicit guard chain.
//!
//! A [`GuardChain`] is an ordered list of plain functions over the
//! authenticated context and request path. [`guard_middleware`] validates the
//! bearer credential, runs the chain, and stores the [`AuthContext`] in the
//! request extensions for downstream extractors.
//!
//! # Example
//!
//! ```ignore
//! let admin = GuardState::new(auth_state, GuardChain::new().stage(require_role(ROLE_ADMIN)));
//! let app = Router::new()
//!     .route("/api/admin/dashboard", get(dashboard))
//!     .route_layer(middleware::from_fn_with_state(admin, guard_middleware));
//! ```

use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AuthError;

use super::auth::AuthState;
use super::types::AuthContext;

/// Verdict of one guard stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(String),
}

/// A single authorization stage.
pub type Guard = Arc<dyn Fn(&AuthContext, &str) -> Access + Send + Sync>;

/// Admits any authenticated principal.
#[must_use]
pub fn authenticated() -> Guard {
    Arc::new(|_: &AuthContext, _: &str| Access::Allow)
}

/// Requires `role`, honouring the role hierarchy.
#[must_use]
pub fn require_role(role: &'static str) -> Guard {
    Arc::new(move |ctx: &AuthContext, _: &str| {
        if ctx.has_role(role) {
            Access::Allow
        } else {
            Access::Deny(format!("{role} required"))
        }
    })
}

/// Ordered guard stages; the first denial wins.
#[derive(Clone, Default)]
pub struct GuardChain {
    stages: Vec<Guard>,
}

impl fmt::Debug for GuardChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl GuardChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, guard: Guard) -> Self {
        self.stages.push(guard);
        self
    }

    /// Runs every stage in order until one denies.
    #[must_use]
    pub fn evaluate(&self, ctx: &AuthContext, path: &str) -> Access {
        for guard in &self.stages {
            if let Access::Deny(reason) = guard(ctx, path) {
                return Access::Deny(reason);
            }
        }
        Access::Allow
    }
}

/// State for [`guard_middleware`].
#[derive(Clone)]
pub struct GuardState {
    pub auth: AuthState,
    pub chain: GuardChain,
}

impl GuardState {
    pub fn new(auth: AuthState, chain: GuardChain) -> Self {
        Self { auth, chain }
    }
}

/// Authenticates the request and enforces the guard chain.
///
/// Missing or invalid credentials yield 401; a denying stage yields 403.
pub async fn guard_middleware(
    State(state): State<GuardState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    let ctx = match state.auth.authenticate(req.headers()) {
        Ok(ctx) => ctx,
        Err(e) => return e.at(path).into_response(),
    };

    if let Access::Deny(reason) = state.chain.evaluate(&ctx, &path) {
        tracing::debug!(
            subject = %ctx.subject(),
            path = %path,
            reason = %reason,
            "Access denied by guard"
        );
        return AuthError::forbidden(reason).at(path).into_response();
    }

    req.extensions_mut().insert(ctx);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwt::AccessTokenClaims;
    use crate::types::{ROLE_ADMIN, ROLE_USER};
    use time::OffsetDateTime;

    fn context(roles: &[&str]) -> AuthContext {
        let claims = AccessTokenClaims::builder("iss", "alice", OffsetDateTime::now_utc())
            .roles(roles.iter().map(ToString::to_string).collect())
            .build();
        AuthContext::new(claims)
    }

    #[test]
    fn test_empty_chain_allows() {
        assert_eq!(
            GuardChain::new().evaluate(&context(&[]), "/"),
            Access::Allow
        );
    }

    #[test]
    fn test_require_role_applies_hierarchy() {
        let chain = GuardChain::new()
            .stage(authenticated())
            .stage(require_role(ROLE_USER));

        assert_eq!(chain.evaluate(&context(&[ROLE_ADMIN]), "/"), Access::Allow);
        assert_eq!(
            chain.evaluate(&context(&[]), "/"),
            Access::Deny("ROLE_USER required".to_string())
        );
    }

    #[test]
    fn test_first_denial_wins() {
        let chain = GuardChain::new()
            .stage(Arc::new(|_: &AuthContext, path: &str| {
                if path.starts_with("/api/admin") {
                    Access::Deny("admin area".to_string())
                } else {
                    Access::Allow
                }
            }))
            .stage(require_role(ROLE_ADMIN));

        assert_eq!(
            chain.evaluate(&context(&[ROLE_USER]), "/api/admin/dashboard"),
            Access::Deny("admin area".to_string())
        );
        assert_eq!(
            chain.evaluate(&context(&[ROLE_USER]), "/api/other"),
            Access::Deny("ROLE_ADMIN required".to_string())
        );
    }
}
