//! JWT encoding, signature verification and JWKS export.
//!
//! Access credentials are signed with either an RSA key pair (`RS256`,
//! `RS384`) or an HMAC shared secret (`HS256`). This module only proves that
//! a token was signed by the configured key and deserializes its claims;
//! issuer, lifetime, audience, type and revocation are judged by the
//! validation pipeline in [`crate::token::validation`].
//!
//! ## Example
//!
//! ```ignore
//! use keygate_auth::token::jwt::{AccessTokenClaims, JwtService, SigningAlgorithm, SigningKeyPair};
//!
//! let key_pair = SigningKeyPair::generate_rsa("key-1", SigningAlgorithm::RS256)?;
//! let jwt = JwtService::new(key_pair);
//!
//! let claims = AccessTokenClaims::builder("https://issuer", "alice", now)
//!     .audience(vec!["api".to_string()])
//!     .build();
//! let token = jwt.encode(&claims)?;
//! let verified: AccessTokenClaims = jwt.verify(&token)?;
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use time::{Duration, OffsetDateTime};

use crate::config::{ConfigError, SigningConfig};

/// The only `token_type` value accepted for access credentials.
pub const ACCESS_TOKEN_TYPE: &str = "access";

/// Failure to sign, verify or load a key.
///
/// Verification never inspects claims; a token that decodes under the
/// configured key is handed to the validation pipeline as is.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to sign token: {0}")]
    Signing(String),

    /// Signature does not verify under the configured key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Not a well-formed JWT, or the payload is not the expected claim set.
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Signing key error: {0}")]
    Key(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                Self::Key(err.to_string())
            }
            _ => Self::Malformed(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// HMAC with SHA-256 over a shared secret.
    HS256,
}

impl SigningAlgorithm {
    /// Parses a configured algorithm name.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for unknown names.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "HS256" => Ok(Self::HS256),
            other => Err(ConfigError::InvalidValue(format!(
                "unsupported signing algorithm '{other}'"
            ))),
        }
    }

    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::HS256 => Algorithm::HS256,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::HS256 => "HS256",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Access credential claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (username).
    pub sub: String,

    /// Audience set. Accepts a single string or an array on input.
    #[serde(default, deserialize_with = "audience_set")]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// JWT ID (unique identifier for revocation).
    pub jti: String,

    /// Credential kind; `access` for access credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Granted roles.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AccessTokenClaims {
    /// Creates a new builder for access token claims issued at `issued_at`.
    #[must_use]
    pub fn builder(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        issued_at: OffsetDateTime,
    ) -> AccessTokenClaimsBuilder {
        AccessTokenClaimsBuilder::new(issuer, subject, issued_at)
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.exp).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

fn audience_set<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(aud)) => vec![aud],
        Some(OneOrMany::Many(auds)) => auds,
    })
}

/// Builder for `AccessTokenClaims`.
pub struct AccessTokenClaimsBuilder {
    iss: String,
    sub: String,
    aud: Vec<String>,
    exp: i64,
    iat: i64,
    jti: String,
    token_type: Option<String>,
    roles: Vec<String>,
}

impl AccessTokenClaimsBuilder {
    fn new(issuer: impl Into<String>, subject: impl Into<String>, issued_at: OffsetDateTime) -> Self {
        let iat = issued_at.unix_timestamp();
        Self {
            iss: issuer.into(),
            sub: subject.into(),
            aud: Vec::new(),
            exp: iat + 900,
            iat,
            jti: uuid::Uuid::new_v4().to_string(),
            token_type: Some(ACCESS_TOKEN_TYPE.to_string()),
            roles: Vec::new(),
        }
    }

    /// Sets the audience.
    #[must_use]
    pub fn audience(mut self, aud: Vec<String>) -> Self {
        self.aud = aud;
        self
    }

    /// Sets the expiration relative to `iat`.
    #[must_use]
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.exp = self.iat + lifetime.whole_seconds();
        self
    }

    /// Overrides the `token_type` claim; `None` omits it.
    #[must_use]
    pub fn token_type(mut self, token_type: Option<&str>) -> Self {
        self.token_type = token_type.map(ToString::to_string);
        self
    }

    /// Sets the roles.
    #[must_use]
    pub fn roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Overrides the generated `jti`.
    #[must_use]
    pub fn jti(mut self, jti: impl Into<String>) -> Self {
        self.jti = jti.into();
        self
    }

    /// Builds the access token claims.
    #[must_use]
    pub fn build(self) -> AccessTokenClaims {
        AccessTokenClaims {
            iss: self.iss,
            sub: self.sub,
            aud: self.aud,
            exp: self.exp,
            iat: self.iat,
            jti: self.jti,
            token_type: self.token_type,
            roles: self.roles,
        }
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key (RSA public key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always `RSA`.
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use (`sig`).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    pub n: String,

    /// RSA exponent (base64url encoded).
    pub e: String,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// A signing key for JWT operations.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,

    /// RSA modulus and exponent for JWKS export; `None` for shared secrets.
    public_components: Option<(Vec<u8>, Vec<u8>)>,
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generates a new 2048-bit RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
    ) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::Key(format!(
                "Algorithm {algorithm} is not RSA-based"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::Key(e.to_string()))?;
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::Key(e.to_string()))?;
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::Key(e.to_string()))?;

        Self::from_pem(kid, algorithm, private_pem.as_str(), &public_pem)
    }

    /// Loads an RSA key pair from PEM strings.
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::Key(format!(
                "Algorithm {algorithm} cannot be loaded from PEM"
            )));
        }

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::Key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::Key(e.to_string()))?;

        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| JwtError::Key(e.to_string()))?;
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            public_components: Some((n, e)),
        })
    }

    /// Creates an `HS256` key from a shared secret.
    #[must_use]
    pub fn from_secret(kid: impl Into<String>, secret: &[u8]) -> Self {
        Self {
            kid: kid.into(),
            algorithm: SigningAlgorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            public_components: None,
        }
    }

    /// Builds the key described by the signing configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if the algorithm is unknown, a key file cannot be
    /// read or parsed, or no key source is configured.
    pub fn from_config(config: &SigningConfig) -> Result<Self, ConfigError> {
        let algorithm = SigningAlgorithm::parse(&config.algorithm)?;

        if !algorithm.is_rsa() {
            let secret = config
                .secret
                .as_deref()
                .ok_or_else(|| ConfigError::Missing("auth.signing.secret".to_string()))?;
            return Ok(Self::from_secret(&config.key_id, secret.as_bytes()));
        }

        match (&config.private_key_path, &config.public_key_path) {
            (Some(private_path), Some(public_path)) => {
                let private_pem = read_pem(private_path)?;
                let public_pem = read_pem(public_path)?;
                let key = Self::from_pem(&config.key_id, algorithm, &private_pem, &public_pem)
                    .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
                tracing::info!(kid = %key.kid, path = %private_path.display(), "Loaded signing key");
                Ok(key)
            }
            _ if config.generate_if_missing => {
                let key = Self::generate_rsa(&config.key_id, algorithm)
                    .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
                tracing::warn!(
                    kid = %key.kid,
                    "No signing key configured, generated an ephemeral RSA key pair"
                );
                Ok(key)
            }
            _ => Err(ConfigError::Missing(
                "auth.signing.private_key_path / public_key_path".to_string(),
            )),
        }
    }

    /// Exports the public key as a JWK. Shared secrets are never published.
    #[must_use]
    pub fn to_jwk(&self) -> Option<Jwk> {
        let (n, e) = self.public_components.as_ref()?;
        Some(Jwk {
            kty: "RSA".to_string(),
            kid: self.kid.clone(),
            use_: "sig".to_string(),
            alg: self.algorithm.as_str().to_string(),
            n: URL_SAFE_NO_PAD.encode(n),
            e: URL_SAFE_NO_PAD.encode(e),
        })
    }
}

fn read_pem(path: &std::path::Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// JWT Service
// ============================================================================

/// Service for encoding and verifying JWT tokens.
///
/// `Send + Sync`; share it behind an `Arc`.
#[derive(Debug)]
pub struct JwtService {
    signing_key: SigningKeyPair,
}

impl JwtService {
    /// Creates a new JWT service.
    #[must_use]
    pub fn new(signing_key: SigningKeyPair) -> Self {
        Self { signing_key }
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, claims, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Verifies the signature and deserializes the claims.
    ///
    /// No registered claim is judged here: expiry, issuer and audience are
    /// left to the caller so they can be evaluated against an injected clock
    /// and reported together.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, signed with another key or
    /// algorithm, or its payload does not deserialize into `T`.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, JwtError> {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<T>(token, &self.signing_key.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::from)
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.signing_key.algorithm
    }

    /// Returns the JWKS containing the public key, empty for shared secrets.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: self.signing_key.to_jwk().into_iter().collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-03-01 10:00 UTC);

    fn hs256() -> JwtService {
        JwtService::new(SigningKeyPair::from_secret(
            "test-key",
            b"0123456789abcdef0123456789abcdef",
        ))
    }

    fn sample_claims() -> AccessTokenClaims {
        AccessTokenClaims::builder("https://issuer.example", "alice", NOW)
            .audience(vec!["api".to_string()])
            .roles(vec!["ROLE_USER".to_string()])
            .lifetime(Duration::minutes(15))
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let claims = sample_claims();
        assert_eq!(claims.iat, NOW.unix_timestamp());
        assert_eq!(claims.exp, claims.iat + 900);
        assert_eq!(claims.token_type.as_deref(), Some(ACCESS_TOKEN_TYPE));
        assert!(uuid::Uuid::parse_str(&claims.jti).is_ok());
        assert_eq!(claims.expires_at(), NOW + Duration::minutes(15));
    }

    #[test]
    fn test_builder_generates_distinct_jtis() {
        assert_ne!(sample_claims().jti, sample_claims().jti);
    }

    #[test]
    fn test_rs256_encode_verify() {
        let key_pair = SigningKeyPair::generate_rsa("kid-1", SigningAlgorithm::RS256).unwrap();
        let service = JwtService::new(key_pair);

        let token = service.encode(&sample_claims()).unwrap();
        let decoded: AccessTokenClaims = service.verify(&token).unwrap();
        assert_eq!(decoded, sample_claims_with_jti(&decoded.jti));
    }

    fn sample_claims_with_jti(jti: &str) -> AccessTokenClaims {
        AccessTokenClaims {
            jti: jti.to_string(),
            ..sample_claims()
        }
    }

    #[test]
    fn test_verify_ignores_expiry() {
        let service = hs256();
        let claims = AccessTokenClaims::builder("iss", "alice", datetime!(2000-01-01 00:00 UTC))
            .build();

        let token = service.encode(&claims).unwrap();
        let decoded: AccessTokenClaims = service.verify(&token).unwrap();
        assert_eq!(decoded.sub, "alice");
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let signer = hs256();
        let other = JwtService::new(SigningKeyPair::from_secret(
            "other",
            b"ffffffffffffffffffffffffffffffff",
        ));

        let token = signer.encode(&sample_claims()).unwrap();
        let result = other.verify::<AccessTokenClaims>(&token);
        assert!(matches!(result.unwrap_err(), JwtError::InvalidSignature));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(hs256().verify::<AccessTokenClaims>("not.a.jwt").is_err());
        assert!(hs256().verify::<AccessTokenClaims>("").is_err());
    }

    #[test]
    fn test_audience_accepts_string_array_or_missing() {
        let base = serde_json::json!({
            "iss": "i", "sub": "s", "exp": 2, "iat": 1, "jti": "j"
        });

        let mut single = base.clone();
        single["aud"] = serde_json::json!("api");
        let claims: AccessTokenClaims = serde_json::from_value(single).unwrap();
        assert_eq!(claims.aud, vec!["api"]);

        let mut many = base.clone();
        many["aud"] = serde_json::json!(["a", "b"]);
        let claims: AccessTokenClaims = serde_json::from_value(many).unwrap();
        assert_eq!(claims.aud, vec!["a", "b"]);

        let claims: AccessTokenClaims = serde_json::from_value(base).unwrap();
        assert!(claims.aud.is_empty());
        assert!(claims.token_type.is_none());
        assert!(claims.roles.is_empty());
    }

    #[test]
    fn test_token_type_omitted_when_none() {
        let claims = AccessTokenClaims::builder("i", "s", NOW)
            .token_type(None)
            .build();
        let json = serde_json::to_string(&claims).unwrap();
        assert!(!json.contains("token_type"));
    }

    #[test]
    fn test_jwks_rsa() {
        let key_pair = SigningKeyPair::generate_rsa("kid-1", SigningAlgorithm::RS256).unwrap();
        let service = JwtService::new(key_pair);

        let jwks = service.jwks();
        assert_eq!(jwks.keys.len(), 1);
        let jwk = &jwks.keys[0];
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid, "kid-1");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.e, "AQAB");

        let json = serde_json::to_string(&jwks).unwrap();
        assert!(json.contains("\"use\":\"sig\""));
    }

    #[test]
    fn test_jwks_empty_for_shared_secret() {
        assert!(hs256().jwks().keys.is_empty());
    }

    #[test]
    fn test_from_config_generates_when_missing() {
        let config = SigningConfig::default();
        let key = SigningKeyPair::from_config(&config).unwrap();
        assert_eq!(key.algorithm, SigningAlgorithm::RS256);
        assert_eq!(key.kid, config.key_id);
    }

    #[test]
    fn test_from_config_missing_file() {
        let config = SigningConfig {
            private_key_path: Some("/nonexistent/private.pem".into()),
            public_key_path: Some("/nonexistent/public.pem".into()),
            ..SigningConfig::default()
        };
        let err = SigningKeyPair::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_from_config_hs256() {
        let config = SigningConfig {
            algorithm: "HS256".to_string(),
            secret: Some("x".repeat(32)),
            ..SigningConfig::default()
        };
        let key = SigningKeyPair::from_config(&config).unwrap();
        assert_eq!(key.algorithm, SigningAlgorithm::HS256);
        assert!(key.to_jwk().is_none());
    }

    #[test]
    fn test_signing_algorithm_parse() {
        assert_eq!(SigningAlgorithm::parse("RS384").unwrap(), SigningAlgorithm::RS384);
        assert!(SigningAlgorithm::parse("none").is_err());
        assert!(SigningAlgorithm::RS256.is_rsa());
        assert!(!SigningAlgorithm::HS256.is_rsa());
    }
}
