//! Domain types shared by the credential services.
//!
//! - [`RefreshCredential`] - rotating refresh credential
//! - [`Principal`] - authenticated identity with its roles

pub mod principal;
pub mod refresh_token;

pub use principal::{Principal, ROLE_ADMIN, ROLE_USER, satisfies_role};
pub use refresh_token::RefreshCredential;
