//! Error types for credential issuance, validation, rotation and rate limiting.
//!
//! Components return these structured failures; only the HTTP layer
//! (see [`crate::middleware::error`]) maps them to status codes.

use std::fmt;

use serde::Serialize;

use crate::ratelimit::Tier;

// ============================================================================
// Validation
// ============================================================================

/// A single reason an access credential was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Malformed token or signature mismatch under the configured key.
    InvalidSignature,
    /// `iss` differs from the configured issuer.
    InvalidIssuer,
    /// Current time is outside `[iat, exp]`.
    Expired,
    /// `aud` does not contain the configured audience.
    InvalidAudience,
    /// `token_type` is missing or not `access`.
    InvalidTokenType,
    /// The `jti` is on the revocation list.
    TokenBlacklisted,
}

impl Reason {
    /// Wire code for the reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidIssuer => "invalid_issuer",
            Self::Expired => "expired",
            Self::InvalidAudience => "invalid_audience",
            Self::InvalidTokenType => "invalid_token_type",
            Self::TokenBlacklisted => "token_blacklisted",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection produced by the validation pipeline, carrying every failed check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Access credential rejected: {}", join_reasons(.reasons))]
pub struct ValidationFailure {
    /// Reasons in pipeline order. Never empty.
    pub reasons: Vec<Reason>,
}

impl ValidationFailure {
    /// Creates a failure from the collected reasons.
    #[must_use]
    pub fn new(reasons: Vec<Reason>) -> Self {
        Self { reasons }
    }
}

fn join_reasons(reasons: &[Reason]) -> String {
    reasons
        .iter()
        .map(Reason::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Rotation
// ============================================================================

/// Failure to rotate a refresh credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RotationError {
    /// No credential with the presented token exists.
    #[error("Refresh token not found")]
    NotFound,

    /// The credential is unused but past its expiry.
    #[error("Refresh token expired")]
    Expired,

    /// The credential was already used; its whole family has been invalidated.
    #[error("Refresh token reuse detected")]
    ReuseDetected,
}

impl RotationError {
    /// Wire code for the error.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::ReuseDetected => "reuse_detected",
        }
    }

    /// Returns `true` for the theft signal.
    #[must_use]
    pub fn is_reuse(&self) -> bool {
        matches!(self, Self::ReuseDetected)
    }
}

// ============================================================================
// Umbrella error
// ============================================================================

/// Errors that can occur while issuing, validating or enforcing credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Username/password did not match.
    #[error("Invalid credentials")]
    BadCredentials,

    /// The presented access credential failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    /// The presented refresh credential could not be rotated.
    #[error(transparent)]
    Rotation(#[from] RotationError),

    /// The request lacks authentication.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The principal lacks a required role.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The caller exhausted its rate bucket.
    #[error("Too many requests. Rate limit: {limit}")]
    RateLimited {
        /// The tier whose bucket denied the request.
        tier: Tier,
        /// Human-readable rate, e.g. `USER (200/min)`.
        limit: String,
        /// Seconds until the bucket refills.
        retry_after_secs: u64,
    },

    /// The resource already exists.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// The request is malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// Configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `RateLimited` error.
    #[must_use]
    pub fn rate_limited(tier: Tier, limit: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::RateLimited {
            tier,
            limit: limit.into(),
            retry_after_secs,
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Internal { .. })
    }

    /// Returns `true` if the request should be answered with 401.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::BadCredentials
                | Self::Validation(_)
                | Self::Rotation(_)
                | Self::Unauthorized { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BadCredentials | Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::Validation(_) | Self::Rotation(_) => ErrorCategory::Token,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Conflict { .. } | Self::InvalidRequest { .. } => ErrorCategory::Request,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Attaches the request path, producing an HTTP-ready error.
    #[must_use]
    pub fn at(self, path: impl Into<String>) -> crate::middleware::ApiError {
        crate::middleware::ApiError::new(self, path)
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity verification failed or is missing.
    Authentication,
    /// The principal lacks permission.
    Authorization,
    /// Access or refresh credential problems.
    Token,
    /// Rate limit exhaustion.
    RateLimit,
    /// Malformed or conflicting request.
    Request,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Request => write!(f, "request"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
