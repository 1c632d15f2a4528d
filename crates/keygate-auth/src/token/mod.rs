//! Credential lifecycle.
//!
//! - [`jwt`] - signing, signature verification and JWKS export
//! - [`validation`] - the access credential validation pipeline
//! - [`revocation`] - the `jti` revocation list and its sweeper
//! - [`rotation`] - refresh credential rotation and reuse detection
//! - [`issuance`] - login, refresh and logout

pub mod issuance;
pub mod jwt;
pub mod revocation;
pub mod rotation;
pub mod validation;

pub use issuance::{IssuanceConfig, IssuanceService, LogoutOutcome, TokenPair};
pub use jwt::{
    ACCESS_TOKEN_TYPE, AccessTokenClaims, AccessTokenClaimsBuilder, Jwk, Jwks, JwtError,
    JwtService, SigningAlgorithm, SigningKeyPair,
};
pub use revocation::{RevocationEntry, RevocationList, SweepHandle};
pub use rotation::{DEFAULT_REFRESH_LIFETIME, RotationLedger};
pub use validation::{CLAIM_CHECKS, Check, CheckContext, ValidationPipeline};
