//! Credential issuance: login, refresh and logout.
//!
//! # Usage
//!
//! ```ignore
//! use keygate_auth::token::{IssuanceConfig, IssuanceService};
//!
//! let config = IssuanceConfig::new("https://auth.example.com", "example-api");
//! let service = IssuanceService::new(jwt, ledger, revocations, authenticator, clock, config);
//!
//! let pair = service.login("alice", "password").await?;
//! let rotated = service.refresh(&pair.refresh_token).await?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use super::jwt::{AccessTokenClaims, JwtService};
use super::revocation::RevocationList;
use super::rotation::RotationLedger;
use crate::AuthResult;
use crate::authenticator::Authenticator;
use crate::clock::SharedClock;
use crate::error::AuthError;
use crate::types::Principal;

/// Configuration for the issuance service.
#[derive(Debug, Clone)]
pub struct IssuanceConfig {
    /// `iss` claim value.
    pub issuer: String,

    /// Sole entry of the `aud` claim.
    pub audience: String,

    /// Access credential lifetime.
    pub access_token_lifetime: Duration,
}

impl IssuanceConfig {
    /// Creates a configuration with the default 15 minute access lifetime.
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            access_token_lifetime: Duration::minutes(15),
        }
    }

    /// Sets the access token lifetime.
    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }
}

/// Access/refresh pair returned by login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    /// Signed access credential.
    pub access_token: String,

    /// Opaque refresh credential.
    pub refresh_token: String,

    /// Always `Bearer`.
    pub token_type: &'static str,

    /// Access credential lifetime in seconds.
    pub expires_in: i64,

    /// Roles embedded in the access credential.
    pub roles: Vec<String>,

    /// Set on refresh responses.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub refreshed_at: Option<OffsetDateTime>,
}

/// What a logout actually revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogoutOutcome {
    /// The access credential's `jti` was added to the revocation list.
    pub access_token_revoked: bool,

    /// The presented refresh credential was found and its family invalidated.
    pub refresh_token_revoked: bool,
}

/// Mints credentials for authenticated principals.
pub struct IssuanceService {
    jwt: Arc<JwtService>,
    ledger: Arc<RotationLedger>,
    revocations: Arc<RevocationList>,
    authenticator: Arc<dyn Authenticator>,
    clock: SharedClock,
    config: IssuanceConfig,
}

impl IssuanceService {
    /// Creates a new issuance service.
    #[must_use]
    pub fn new(
        jwt: Arc<JwtService>,
        ledger: Arc<RotationLedger>,
        revocations: Arc<RevocationList>,
        authenticator: Arc<dyn Authenticator>,
        clock: SharedClock,
        config: IssuanceConfig,
    ) -> Self {
        Self {
            jwt,
            ledger,
            revocations,
            authenticator,
            clock,
            config,
        }
    }

    /// Authenticates `username` and issues a fresh pair with a new refresh
    /// family.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::BadCredentials` if authentication fails.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<TokenPair> {
        let principal = match self.authenticator.authenticate(username, password).await {
            Ok(principal) => principal,
            Err(e) => {
                warn!(username = %username, error = %e, "Login failed");
                return Err(e);
            }
        };

        let (access_token, _) = self.mint_access(&principal)?;
        let refresh = self.ledger.create(&principal.username);

        info!(username = %principal.username, "Tokens issued");
        Ok(self.pair(access_token, refresh.token, principal.roles, None))
    }

    /// Rotates `refresh_token` and issues a new pair in the same family.
    ///
    /// Roles are re-read from the authenticator so role changes take effect
    /// at the next refresh.
    ///
    /// # Errors
    ///
    /// - `AuthError::Rotation` if the ledger rejects the token
    /// - `AuthError::Unauthorized` if the principal no longer exists
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let successor = self.ledger.rotate(refresh_token)?;

        let Some(principal) = self.authenticator.find(&successor.username).await? else {
            self.ledger.invalidate_family(&successor.family_id);
            warn!(username = %successor.username, "Refresh for unknown principal");
            return Err(AuthError::unauthorized("Principal no longer exists"));
        };

        let (access_token, _) = self.mint_access(&principal)?;
        let refreshed_at = self.clock.now();
        Ok(self.pair(
            access_token,
            successor.token,
            principal.roles,
            Some(refreshed_at),
        ))
    }

    /// Revokes the presented access credential and, if given and known, the
    /// refresh family of `refresh_token`.
    pub fn logout(
        &self,
        claims: Option<&AccessTokenClaims>,
        refresh_token: Option<&str>,
    ) -> LogoutOutcome {
        let access_token_revoked = match claims {
            Some(claims) => {
                self.revocations
                    .revoke(Some(&claims.jti), Some(claims.expires_at()));
                true
            }
            None => false,
        };

        let refresh_token_revoked =
            match refresh_token.and_then(|token| self.ledger.find_by_token(token)) {
                Some(credential) => {
                    self.ledger.invalidate_family(&credential.family_id);
                    true
                }
                None => false,
            };

        info!(
            sub = claims.map(|c| c.sub.as_str()).unwrap_or("-"),
            access_token_revoked, refresh_token_revoked, "Logout"
        );

        LogoutOutcome {
            access_token_revoked,
            refresh_token_revoked,
        }
    }

    /// Signs an access credential for `principal`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if signing fails.
    pub fn mint_access(&self, principal: &Principal) -> AuthResult<(String, AccessTokenClaims)> {
        let claims = AccessTokenClaims::builder(
            &self.config.issuer,
            &principal.username,
            self.clock.now(),
        )
        .audience(vec![self.config.audience.clone()])
        .lifetime(self.config.access_token_lifetime)
        .roles(principal.roles.clone())
        .build();

        let token = self
            .jwt
            .encode(&claims)
            .map_err(|e| AuthError::internal(e.to_string()))?;
        Ok((token, claims))
    }

    fn pair(
        &self,
        access_token: String,
        refresh_token: String,
        roles: Vec<String>,
        refreshed_at: Option<OffsetDateTime>,
    ) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.config.access_token_lifetime.whole_seconds(),
            roles,
            refreshed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::UserDirectory;
    use crate::clock::{Clock, ManualClock};
    use crate::error::{Reason, RotationError};
    use crate::token::jwt::SigningKeyPair;
    use crate::token::validation::ValidationPipeline;
    use crate::types::{ROLE_ADMIN, ROLE_USER};

    const ISSUER: &str = "https://issuer.example";
    const AUDIENCE: &str = "keygate-api";

    struct Fixture {
        clock: Arc<ManualClock>,
        directory: Arc<UserDirectory>,
        ledger: Arc<RotationLedger>,
        service: IssuanceService,
        pipeline: ValidationPipeline,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let jwt = Arc::new(JwtService::new(SigningKeyPair::from_secret(
            "test",
            b"0123456789abcdef0123456789abcdef",
        )));
        let revocations = Arc::new(RevocationList::in_memory(clock.clone()));
        let ledger = Arc::new(RotationLedger::in_memory(clock.clone(), Duration::days(7)));
        let directory = Arc::new(UserDirectory::new());
        directory
            .add_user("user", "password", vec![ROLE_USER.to_string()])
            .unwrap();

        let service = IssuanceService::new(
            jwt.clone(),
            ledger.clone(),
            revocations.clone(),
            directory.clone(),
            clock.clone(),
            IssuanceConfig::new(ISSUER, AUDIENCE),
        );
        let pipeline = ValidationPipeline::new(jwt, revocations, clock.clone(), ISSUER, AUDIENCE);

        Fixture {
            clock,
            directory,
            ledger,
            service,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_login_issues_valid_pair() {
        let f = fixture();
        let pair = f.service.login("user", "password").await.unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);
        assert_eq!(pair.roles, vec![ROLE_USER.to_string()]);
        assert!(pair.refreshed_at.is_none());

        let claims = f.pipeline.validate(&pair.access_token).unwrap();
        assert_eq!(claims.sub, "user");
        assert_eq!(claims.aud, vec![AUDIENCE.to_string()]);
        assert_eq!(claims.exp - claims.iat, 900);
        assert!(f.ledger.find_by_token(&pair.refresh_token).is_some());
    }

    #[tokio::test]
    async fn test_repeated_logins_have_distinct_jtis() {
        let f = fixture();
        let a = f.service.login("user", "password").await.unwrap();
        let b = f.service.login("user", "password").await.unwrap();

        let ja = f.pipeline.validate(&a.access_token).unwrap().jti;
        let jb = f.pipeline.validate(&b.access_token).unwrap().jti;
        assert_ne!(ja, jb);
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let f = fixture();
        assert!(matches!(
            f.service.login("user", "wrong").await,
            Err(AuthError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_picks_up_new_roles() {
        let f = fixture();
        f.directory
            .add_user("promoted", "pw", vec![ROLE_USER.to_string()])
            .unwrap();
        let pair = f.service.login("promoted", "pw").await.unwrap();

        // Simulate a role change by replacing the account.
        let replacement = UserDirectory::new();
        replacement
            .add_user("promoted", "pw", vec![ROLE_ADMIN.to_string()])
            .unwrap();
        let service = IssuanceService::new(
            f.service.jwt.clone(),
            f.ledger.clone(),
            f.service.revocations.clone(),
            Arc::new(replacement),
            f.clock.clone(),
            IssuanceConfig::new(ISSUER, AUDIENCE),
        );

        let refreshed = service.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(refreshed.refresh_token, pair.refresh_token);
        assert_eq!(refreshed.refreshed_at, Some(f.clock.now()));
        assert_eq!(refreshed.roles, vec![ROLE_ADMIN.to_string()]);

        let replay = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(
            replay,
            AuthError::Rotation(RotationError::ReuseDetected)
        ));
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_principal() {
        let f = fixture();
        let credential = f.ledger.create("ghost");

        let err = f.service.refresh(&credential.token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_logout_revokes_access_and_refresh_family() {
        let f = fixture();
        let pair = f.service.login("user", "password").await.unwrap();
        let claims = f.pipeline.validate(&pair.access_token).unwrap();

        let outcome = f
            .service
            .logout(Some(&claims), Some(pair.refresh_token.as_str()));
        assert!(outcome.access_token_revoked);
        assert!(outcome.refresh_token_revoked);

        let failure = f.pipeline.validate(&pair.access_token).unwrap_err();
        assert_eq!(failure.reasons, vec![Reason::TokenBlacklisted]);

        let err = f.service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Rotation(RotationError::ReuseDetected)
        ));
    }

    #[tokio::test]
    async fn test_logout_with_unknown_refresh_token() {
        let f = fixture();
        let pair = f.service.login("user", "password").await.unwrap();
        let claims = f.pipeline.validate(&pair.access_token).unwrap();

        let outcome = f.service.logout(Some(&claims), Some("unknown"));
        assert!(outcome.access_token_revoked);
        assert!(!outcome.refresh_token_revoked);
    }
}
