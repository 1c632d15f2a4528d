//! Bearer token authentication extractor.
//!
//! This module provides Axum extractors for validating Bearer tokens
//! and extracting authentication context from requests.
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
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .with_state(auth_state);
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};

use crate::error::AuthError;
use crate::token::validation::ValidationPipeline;

use super::error::ApiError;
use super::types::AuthContext;

// =============================================================================
// Auth State
// =============================================================================

/// State required for bearer token authentication.
///
/// This struct should be included in your application state and made
/// available to the `BearerAuth` extractor via `FromRef`.
///
/// # Example
///
/// ```ignore
/// #[derive(Clone)]
/// struct AppState {
///     auth: AuthState,
///     // ... other state
/// }
///
/// impl FromRef<AppState> for AuthState {
///     fn from_ref(state: &AppState) -> Self {
///         state.auth.clone()
///     }
/// }
/// ```
#[derive(Clone)]
pub struct AuthState {
    /// Validation pipeline for presented access credentials.
    pub pipeline: Arc<ValidationPipeline>,
}

impl AuthState {
    /// Creates a new auth state.
    pub fn new(pipeline: Arc<ValidationPipeline>) -> Self {
        Self { pipeline }
    }

    /// Validates the bearer credential in `headers`.
    ///
    /// # Errors
    ///
    /// - `AuthError::Unauthorized` if the header is missing or malformed
    /// - `AuthError::Validation` if any validation check fails
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let token = bearer_token(headers)
            .ok_or_else(|| AuthError::unauthorized("Missing Authorization header"))?;

        let claims = self.pipeline.validate(token)?;

        tracing::debug!(
            subject = %claims.sub,
            jti = %claims.jti,
            "Token validated successfully"
        );
        Ok(AuthContext::new(claims))
    }
}

/// Parses `Authorization: Bearer <token>`, ignoring empty tokens.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// =============================================================================
// Bearer Auth Extractor
// =============================================================================

/// Axum extractor that validates Bearer tokens and extracts auth context.
///
/// If an upstream guard already validated the request, its [`AuthContext`]
/// is taken from the request extensions instead of validating twice.
///
/// # Errors
///
/// Rejects with an [`ApiError`] (401) if the Authorization header is missing
/// or malformed, or if the pipeline rejects the credential.
pub struct BearerAuth(pub AuthContext);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<AuthContext>() {
            return Ok(BearerAuth(ctx.clone()));
        }

        let auth_state = AuthState::from_ref(state);
        auth_state
            .authenticate(&parts.headers)
            .map(BearerAuth)
            .map_err(|e| e.at(parts.uri.path()))
    }
}

// =============================================================================
// Tests
// =============================================================================
