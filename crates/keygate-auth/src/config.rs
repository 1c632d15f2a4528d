//! Credential service configuration.
//!
//! All sections use `#[serde(default)]` so a partial TOML file (or none at
//! all) yields a working development setup. Durations are written in
//! humantime format (`"15m"`, `"7d"`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the credential services.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://api.example.com"
/// audience = "example-api"
///
/// [auth.tokens]
/// access_token_lifetime = "15m"
/// refresh_token_lifetime = "7d"
///
/// [auth.rate_limiting]
/// user_per_window = 200
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Value of the `iss` claim, and the only issuer accepted on validation.
    pub issuer: String,

    /// Audience placed in issued credentials and required on validation.
    pub audience: String,

    /// Credential lifetimes.
    pub tokens: TokenLifetimes,

    /// Signing key source.
    pub signing: SigningConfig,

    /// Revocation list maintenance.
    pub revocation: RevocationConfig,

    /// Per-tier request quotas.
    pub rate_limiting: RateLimitingConfig,

    /// Users seeded into the in-memory directory at start-up.
    pub users: Vec<UserSeed>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            audience: "keygate-api".to_string(),
            tokens: TokenLifetimes::default(),
            signing: SigningConfig::default(),
            revocation: RevocationConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            users: Vec::new(),
        }
    }
}

/// Access and refresh credential lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenLifetimes {
    /// Access credential lifetime (`exp - iat`).
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh credential lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(15 * 60),
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Where the signing key comes from.
///
/// RSA algorithms read a PEM key pair from disk, or generate an ephemeral
/// pair when the paths are unset and `generate_if_missing` is true. `HS256`
/// uses `secret`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// `RS256`, `RS384` or `HS256`.
    pub algorithm: String,

    /// PEM-encoded PKCS#8 private key.
    pub private_key_path: Option<PathBuf>,

    /// PEM-encoded SPKI public key.
    pub public_key_path: Option<PathBuf>,

    /// Shared secret for `HS256`.
    pub secret: Option<String>,

    /// `kid` header and JWKS key id.
    pub key_id: String,

    /// Generate an ephemeral RSA key pair when no key files are configured.
    pub generate_if_missing: bool,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            private_key_path: None,
            public_key_path: None,
            secret: None,
            key_id: "keygate-key-1".to_string(),
            generate_if_missing: true,
        }
    }
}

impl SigningConfig {
    /// Returns `true` for a shared-secret algorithm.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.algorithm.starts_with("HS")
    }

    /// Returns `true` if both key paths are configured.
    #[must_use]
    pub fn has_key_files(&self) -> bool {
        self.private_key_path.is_some() && self.public_key_path.is_some()
    }
}

/// Revocation list maintenance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// Interval between background sweeps of expired entries.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

/// Per-tier request quotas. Buckets refill to capacity once per `window`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Enable the rate-limit middleware.
    pub enabled: bool,

    /// Refill window.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Requests per window for unauthenticated callers, keyed by client IP.
    pub anonymous_per_window: u32,

    /// Requests per window for authenticated users.
    pub user_per_window: u32,

    /// Requests per window for principals holding `ROLE_ADMIN`.
    pub admin_per_window: u32,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(60),
            anonymous_per_window: 60,
            user_per_window: 200,
            admin_per_window: 1000,
        }
    }
}

/// A user seeded into the in-memory directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserSeed {
    /// Login name.
    pub username: String,

    /// Argon2 PHC string (`$argon2id$v=19$...`).
    pub password_hash: String,

    /// Granted roles, e.g. `ROLE_USER`.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// A configured file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// The offending path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

const SUPPORTED_ALGORITHMS: [&str; 3] = ["RS256", "RS384", "HS256"];

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The issuer or audience is empty
    /// - The signing algorithm is not supported
    /// - No signing key source is available
    /// - A lifetime, window or bucket capacity is zero
    /// - The access credential lifetime is not a whole number of seconds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Missing("auth.issuer".to_string()));
        }

        if self.audience.trim().is_empty() {
            return Err(ConfigError::Missing("auth.audience".to_string()));
        }

        if !SUPPORTED_ALGORITHMS.contains(&self.signing.algorithm.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "signing algorithm must be one of {:?}, got '{}'",
                SUPPORTED_ALGORITHMS, self.signing.algorithm
            )));
        }

        if self.signing.is_symmetric() {
            match &self.signing.secret {
                Some(secret) if secret.len() >= 32 => {}
                Some(_) => {
                    return Err(ConfigError::InvalidValue(
                        "auth.signing.secret must be at least 32 bytes".to_string(),
                    ));
                }
                None => return Err(ConfigError::Missing("auth.signing.secret".to_string())),
            }
        } else {
            let partial = self.signing.private_key_path.is_some()
                != self.signing.public_key_path.is_some();
            if partial {
                return Err(ConfigError::InvalidValue(
                    "auth.signing.private_key_path and public_key_path must be set together"
                        .to_string(),
                ));
            }
            if !self.signing.has_key_files() && !self.signing.generate_if_missing {
                return Err(ConfigError::Missing(
                    "auth.signing key files (or enable generate_if_missing)".to_string(),
                ));
            }
        }

        // `exp` and `iat` are whole seconds; anything shorter collapses to exp == iat.
        let access = self.tokens.access_token_lifetime;
        if access.as_secs() == 0 || access.subsec_nanos() != 0 {
            return Err(ConfigError::InvalidValue(
                "auth.tokens.access_token_lifetime must be a whole number of seconds, at least 1s"
                    .to_string(),
            ));
        }

        if self.tokens.refresh_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.tokens.refresh_token_lifetime must be positive".to_string(),
            ));
        }

        if self.revocation.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.revocation.sweep_interval must be positive".to_string(),
            ));
        }

        let limits = &self.rate_limiting;
        if limits.window.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.rate_limiting.window must be positive".to_string(),
            ));
        }
        for (name, capacity) in [
            ("anonymous_per_window", limits.anonymous_per_window),
            ("user_per_window", limits.user_per_window),
            ("admin_per_window", limits.admin_per_window),
        ] {
            if capacity == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "auth.rate_limiting.{name} must be greater than zero"
                )));
            }
        }

        for seed in &self.users {
            if seed.username.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "auth.users entries need a username".to_string(),
                ));
            }
        }

        Ok(())
    }
}
