//! Error response handling for the HTTP boundary.
//!
//! [`ApiError`] pairs an [`AuthError`] with the request path and renders the
//! JSON error body `{timestamp, status, error, message, path}`, extended with
//! `reasons`, `reason` or `tier` depending on the failure.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::AuthError;

/// An [`AuthError`] bound to the request path it occurred on.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ApiError {
    /// The underlying failure.
    pub error: AuthError,
    /// Request path, echoed in the body.
    pub path: String,
}

impl ApiError {
    #[must_use]
    pub fn new(error: AuthError, path: impl Into<String>) -> Self {
        Self {
            error,
            path: path.into(),
        }
    }

    /// HTTP status for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        error_details(&self.error).0
    }
}

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, bearer_error) = error_details(&self.error);
        let message = self.error.to_string();

        let mut body = json!({
            "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            "status": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
            "path": self.path,
        });

        let mut headers = HeaderMap::new();
        match &self.error {
            AuthError::Validation(failure) => {
                body["reasons"] = json!(failure.reasons);
            }
            AuthError::Rotation(err) => {
                body["reason"] = Value::from(err.as_str());
            }
            AuthError::RateLimited {
                tier,
                retry_after_secs,
                ..
            } => {
                body["tier"] = Value::from(tier.as_str());
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            _ => {}
        }

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(bearer_error, &message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(body)).into_response()
    }
}

/// Extracts the HTTP status and RFC 6750 error code for an `AuthError`.
fn error_details(error: &AuthError) -> (StatusCode, &'static str) {
    match error {
        AuthError::BadCredentials | AuthError::Unauthorized { .. } => {
            (StatusCode::UNAUTHORIZED, "invalid_request")
        }
        AuthError::Validation(_) | AuthError::Rotation(_) => {
            (StatusCode::UNAUTHORIZED, "invalid_token")
        }
        AuthError::Forbidden { .. } => (StatusCode::FORBIDDEN, "insufficient_scope"),
        AuthError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        AuthError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        AuthError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
        AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
        }
    }
}

/// Builds the WWW-Authenticate header value for 401 responses.
///
/// Format: `Bearer realm="keygate", error="invalid_token", error_description="..."`
fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped_desc = description.replace('\"', "\\\"");
    format!(
        "Bearer realm=\"keygate\", error=\"{}\", error_description=\"{}\"",
        error, escaped_desc
    )
}

// =============================================================================
// Tests
// =============================================================================
