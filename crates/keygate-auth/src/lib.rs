//! # keygate-auth
//!
//! Bearer credential access control for axum services.
//!
//! This crate provides:
//! - Short-lived signed access credentials and a non-short-circuiting
//!   validation pipeline
//! - Rotating refresh credentials with family-wide reuse detection
//! - A `jti` revocation list with lazy expiry and a background sweeper
//! - Tiered per-identity rate limiting
//!
//! ## Overview
//!
//! Every component is an explicit object passed to its dependents and reads
//! time through an injectable [`clock::Clock`]. Components return structured
//! failures; only [`middleware`] maps them to HTTP status codes.
//!
//! ## Modules
//!
//! - [`config`] - Credential service configuration
//! - [`token`] - Signing, validation, revocation, rotation and issuance
//! - [`ratelimit`] - Tiered rate buckets and identity resolution
//! - [`authenticator`] - Username/password authentication
//! - [`middleware`] - HTTP extractors, guard chain and rate-limit layer
//! - [`http`] - Axum HTTP handlers for the credential endpoints
//! - [`storage`] - Concurrent keyed stores
//! - [`clock`] - Injectable time source

pub mod authenticator;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod password;
pub mod ratelimit;
pub mod storage;
pub mod token;
pub mod types;

pub use authenticator::{Authenticator, UserDirectory};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory, Reason, RotationError, ValidationFailure};
pub use http::{
    JwksState, LogoutState, TokenState, UsersState, jwks_handler, logout_handler, me_handler,
    refresh_handler, register_handler, token_handler,
};
pub use middleware::{
    ApiError, AuthContext, AuthState, BearerAuth, GuardChain, GuardState, RateLimitState,
};
pub use ratelimit::{Decision, Identity, RateLimiter, Tier, TierPolicy};
pub use token::{
    IssuanceConfig, IssuanceService, JwtService, RevocationList, RotationLedger, SigningKeyPair,
    SweepHandle, TokenPair, ValidationPipeline,
};
pub use types::{Principal, ROLE_ADMIN, ROLE_USER, RefreshCredential};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use keygate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::clock::{Clock, SharedClock, SystemClock};
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::middleware::{AuthContext, AuthState, BearerAuth};
    pub use crate::ratelimit::{RateLimiter, Tier};
    pub use crate::token::{IssuanceService, RevocationList, RotationLedger, ValidationPipeline};
    pub use crate::types::{Principal, ROLE_ADMIN, ROLE_USER};
}
