//! HTTP middleware for authentication, authorization and rate limiting.
//!
//! This module provides Axum middleware and extractors for:
//!
//! - Bearer token extraction and validation
//! - Route authorization through an explicit guard chain
//! - Tiered per-identity rate limiting
//! - JSON error responses
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use keygate_auth::middleware::{AuthState, BearerAuth};
//!
//! async fn protected_handler(BearerAuth(auth): BearerAuth) -> String {
//!     format!("Hello, {}!", auth.subject())
//! }
//!
//! let auth_state = AuthState::new(pipeline);
//!
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .with_state(auth_state);
//! ```

pub mod auth;
pub mod error;
pub mod guard;
pub mod rate_limit;
pub mod types;

pub use auth::{AuthState, BearerAuth, bearer_token};
pub use error::ApiError;
pub use guard::{
    Access, Guard, GuardChain, GuardState, authenticated, guard_middleware, require_role,
};
pub use rate_limit::{RATE_LIMIT_TYPE_HEADER, RateLimitState, rate_limit_middleware};
pub use types::AuthContext;
