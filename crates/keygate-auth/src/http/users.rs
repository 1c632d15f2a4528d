//! User endpoints.
//!
//! - `GET /api/users/me` echoes the validated credential's claims
//! - `POST /api/users/register` creates a `ROLE_USER` account

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::Uri,
};
use serde::{Deserialize, Serialize};

use crate::authenticator::UserDirectory;
use crate::middleware::{ApiError, BearerAuth};

use super::token::bad_json;

/// State for the user endpoints.
#[derive(Clone)]
pub struct UsersState {
    pub directory: Arc<UserDirectory>,
}

impl UsersState {
    pub fn new(directory: Arc<UserDirectory>) -> Self {
        Self { directory }
    }
}

/// Claims view returned by `/api/users/me`.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub sub: String,
    pub roles: Vec<String>,
    pub aud: Vec<String>,
    pub token_type: Option<String>,
    pub iss: String,
    pub jti: String,
}

/// Handler for `GET /api/users/me`.
pub async fn me_handler(BearerAuth(auth): BearerAuth) -> Json<MeResponse> {
    let claims = auth.claims();
    Json(MeResponse {
        sub: claims.sub.clone(),
        roles: claims.roles.clone(),
        aud: claims.aud.clone(),
        token_type: claims.token_type.clone(),
        iss: claims.iss.clone(),
        jti: claims.jti.clone(),
    })
}

/// Registration request body. `userName` is accepted as an alias.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, alias = "userName")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub username: String,
    pub roles: Vec<String>,
}

/// Handler for `POST /api/users/register`.
///
/// # Errors
///
/// - 400 if the body is malformed or the username or password is blank
/// - 409 if the username is taken
pub async fn register_handler(
    State(state): State<UsersState>,
    uri: Uri,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_json(&e, uri.path()))?;

    let principal = state
        .directory
        .register(&request.username, &request.password)
        .await
        .map_err(|e| e.at(uri.path()))?;

    Ok(Json(RegisterResponse {
        message: "User created",
        username: principal.username,
        roles: principal.roles,
    }))
}
