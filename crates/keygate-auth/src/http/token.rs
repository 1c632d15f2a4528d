//! Token endpoint handlers.
//!
//! - `POST /api/token` exchanges username and password for a [`TokenPair`]
//! - `POST /api/token/refresh` rotates a refresh credential
//!
//! # Example
//!
//! ```ignore
//! POST /api/token
//! Content-Type: application/json
//!
//! {"username": "user", "password": "password"}
//! ```

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::Uri,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::middleware::ApiError;
use crate::token::{IssuanceService, TokenPair};

/// State required for the token endpoints.
#[derive(Clone)]
pub struct TokenState {
    /// Issuance service for minting and rotating credentials.
    pub issuance: Arc<IssuanceService>,
}

impl TokenState {
    /// Creates a new token state.
    pub fn new(issuance: Arc<IssuanceService>) -> Self {
        Self { issuance }
    }
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Refresh request body.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Maps a JSON extraction failure to a 400 error body.
pub(crate) fn bad_json(rejection: &JsonRejection, path: &str) -> ApiError {
    debug!(error = %rejection, path = %path, "Rejected request body");
    AuthError::invalid_request(rejection.body_text()).at(path)
}

/// Handler for `POST /api/token`.
///
/// # Errors
///
/// - 400 if the body is not a valid login request or a field is blank
/// - 401 if the credentials are wrong
pub async fn token_handler(
    State(state): State<TokenState>,
    uri: Uri,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_json(&e, uri.path()))?;
    if request.username.trim().is_empty() || request.password.trim().is_empty() {
        return Err(
            AuthError::invalid_request("Username and password are required").at(uri.path()),
        );
    }

    state
        .issuance
        .login(&request.username, &request.password)
        .await
        .map(Json)
        .map_err(|e| e.at(uri.path()))
}

/// Handler for `POST /api/token/refresh`.
///
/// # Errors
///
/// - 400 if the body is not a valid refresh request
/// - 401 with `reason` (`not_found`, `expired`, `reuse_detected`) if
///   rotation fails
pub async fn refresh_handler(
    State(state): State<TokenState>,
    uri: Uri,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_json(&e, uri.path()))?;

    state
        .issuance
        .refresh(&request.refresh_token)
        .await
        .map(Json)
        .map_err(|e| {
            if matches!(&e, AuthError::Rotation(r) if r.is_reuse()) {
                warn!(path = %uri.path(), "Refresh token replayed; family revoked");
            }
            e.at(uri.path())
        })
}
