//! Access credential validation pipeline.
//!
//! A presented token first has its signature verified. Without a valid
//! signature no claim can be trusted, so that failure is reported alone as
//! [`Reason::InvalidSignature`]. Every other check then runs over the
//! verified claims in a fixed order, without short-circuiting, and all
//! failures are reported together.
//!
//! | check      | passes when                                   | reason               |
//! |------------|-----------------------------------------------|----------------------|
//! | issuer     | `iss` equals the configured issuer            | `invalid_issuer`     |
//! | lifetime   | `iat <= now <= exp`                           | `expired`            |
//! | audience   | `aud` contains the configured audience        | `invalid_audience`   |
//! | token type | `token_type == "access"`                      | `invalid_token_type` |
//! | revocation | `jti` is not on the revocation list           | `token_blacklisted`  |

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use super::jwt::{ACCESS_TOKEN_TYPE, AccessTokenClaims, JwtService};
use super::revocation::RevocationList;
use crate::clock::SharedClock;
use crate::error::{Reason, ValidationFailure};

/// Inputs shared by every check.
pub struct CheckContext<'a> {
    /// Current time.
    pub now: OffsetDateTime,
    /// Accepted issuer.
    pub issuer: &'a str,
    /// Required audience.
    pub audience: &'a str,
    /// Revocation list consulted by the last check.
    pub revocations: &'a RevocationList,
}

/// A single independent check. Returns the failure reason, if any.
pub type Check = fn(&AccessTokenClaims, &CheckContext<'_>) -> Option<Reason>;

/// The checks that run after signature verification, in reporting order.
pub const CLAIM_CHECKS: [Check; 5] = [
    check_issuer,
    check_lifetime,
    check_audience,
    check_token_type,
    check_revocation,
];

fn check_issuer(claims: &AccessTokenClaims, ctx: &CheckContext<'_>) -> Option<Reason> {
    (claims.iss != ctx.issuer).then_some(Reason::InvalidIssuer)
}

fn check_lifetime(claims: &AccessTokenClaims, ctx: &CheckContext<'_>) -> Option<Reason> {
    let now = ctx.now.unix_timestamp();
    (now < claims.iat || now > claims.exp).then_some(Reason::Expired)
}

fn check_audience(claims: &AccessTokenClaims, ctx: &CheckContext<'_>) -> Option<Reason> {
    (!claims.aud.iter().any(|aud| aud == ctx.audience)).then_some(Reason::InvalidAudience)
}

fn check_token_type(claims: &AccessTokenClaims, _ctx: &CheckContext<'_>) -> Option<Reason> {
    (claims.token_type.as_deref() != Some(ACCESS_TOKEN_TYPE)).then_some(Reason::InvalidTokenType)
}

fn check_revocation(claims: &AccessTokenClaims, ctx: &CheckContext<'_>) -> Option<Reason> {
    ctx.revocations
        .is_revoked(&claims.jti)
        .then_some(Reason::TokenBlacklisted)
}

/// Validates presented access credentials. Read-only.
pub struct ValidationPipeline {
    jwt: Arc<JwtService>,
    revocations: Arc<RevocationList>,
    clock: SharedClock,
    issuer: String,
    audience: String,
}

impl ValidationPipeline {
    /// Creates a pipeline enforcing `issuer` and `audience`.
    #[must_use]
    pub fn new(
        jwt: Arc<JwtService>,
        revocations: Arc<RevocationList>,
        clock: SharedClock,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            jwt,
            revocations,
            clock,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Verifies `token` and runs every claim check.
    ///
    /// # Errors
    /// Returns a [`ValidationFailure`] listing every failed check.
    pub fn validate(&self, token: &str) -> Result<AccessTokenClaims, ValidationFailure> {
        let claims = self.jwt.verify::<AccessTokenClaims>(token).map_err(|e| {
            debug!(error = %e, "Access token signature or structure rejected");
            ValidationFailure::new(vec![Reason::InvalidSignature])
        })?;

        self.check_claims(&claims)?;
        Ok(claims)
    }

    /// Runs the claim checks over already-verified claims.
    ///
    /// # Errors
    /// Returns a [`ValidationFailure`] listing every failed check.
    pub fn check_claims(&self, claims: &AccessTokenClaims) -> Result<(), ValidationFailure> {
        let ctx = CheckContext {
            now: self.clock.now(),
            issuer: &self.issuer,
            audience: &self.audience,
            revocations: &self.revocations,
        };

        let reasons: Vec<Reason> = CLAIM_CHECKS
            .iter()
            .filter_map(|check| check(claims, &ctx))
            .collect();

        if reasons.is_empty() {
            return Ok(());
        }

        debug!(
            jti = %claims.jti,
            sub = %claims.sub,
            reasons = ?reasons,
            "Access token rejected"
        );
        Err(ValidationFailure::new(reasons))
    }

    /// Configured issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Configured audience.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }
}
