//! Logout endpoint handler.
//!
//! `POST /api/logout` revokes the presented access credential until its
//! natural expiry. An optional `X-Refresh-Token` header additionally
//! invalidates that credential's whole refresh family.

use std::sync::Arc;

use axum::{Json, extract::State, http::HeaderMap};
use serde::Serialize;
use time::OffsetDateTime;

use crate::middleware::BearerAuth;
use crate::token::IssuanceService;

/// Header carrying the refresh credential to invalidate on logout.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// State required for the logout endpoint.
#[derive(Clone)]
pub struct LogoutState {
    pub issuance: Arc<IssuanceService>,
}

impl LogoutState {
    /// Creates a new logout state.
    pub fn new(issuance: Arc<IssuanceService>) -> Self {
        Self { issuance }
    }
}

/// Logout response body.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub access_token_revoked: bool,
    pub refresh_token_revoked: bool,
    pub message: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Handler for `POST /api/logout`.
///
/// Requires a valid bearer credential; the `BearerAuth` extractor rejects
/// with 401 otherwise.
pub async fn logout_handler(
    State(state): State<LogoutState>,
    BearerAuth(auth): BearerAuth,
    headers: HeaderMap,
) -> Json<LogoutResponse> {
    let refresh_token = headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let outcome = state.issuance.logout(Some(auth.claims()), refresh_token);

    Json(LogoutResponse {
        access_token_revoked: outcome.access_token_revoked,
        refresh_token_revoked: outcome.refresh_token_revoked,
        message: "Successfully logged out",
        timestamp: OffsetDateTime::now_utc(),
    })
}
