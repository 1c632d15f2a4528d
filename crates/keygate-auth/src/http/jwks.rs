//! JWKS endpoint HTTP handler.
//!
//! Provides the `/.well-known/jwks.json` endpoint so resource servers can
//! verify access credentials issued here without sharing the private key.
//!
//! # References
//!
//! - [RFC 7517 - JSON Web Key](https://tools.ietf.org/html/rfc7517)

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::token::jwt::JwtService;

/// State for the JWKS endpoint.
#[derive(Clone)]
pub struct JwksState {
    /// The JWT service containing the signing keys.
    pub jwt_service: Arc<JwtService>,
}

impl JwksState {
    /// Creates a new JWKS state.
    pub fn new(jwt_service: Arc<JwtService>) -> Self {
        Self { jwt_service }
    }
}

/// Handler for `GET /.well-known/jwks.json`.
///
/// Returns the public half of the signing key. A shared-secret key is never
/// published, so an HS256 deployment serves an empty key set.
///
/// # Example Response
///
/// ```json
/// {
///   "keys": [
///     {
///       "kty": "RSA",
///       "kid": "keygate-key-1",
///       "use": "sig",
///       "alg": "RS256",
///       "n": "base64url-encoded-modulus",
///       "e": "AQAB"
///     }
///   ]
/// }
/// ```
pub async fn jwks_handler(State(state): State<JwksState>) -> impl IntoResponse {
    let jwks = state.jwt_service.jwks();
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(jwks),
    )
}
