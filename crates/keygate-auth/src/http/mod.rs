//! HTTP handlers for the credential endpoints.
//!
//! # Available Handlers
//!
//! - [`token`] - login and refresh
//! - [`logout`] - access credential revocation and family invalidation
//! - [`users`] - current principal and self-registration
//! - [`jwks`] - public signing key

pub mod jwks;
pub mod logout;
pub mod token;
pub mod users;

pub use jwks::{JwksState, jwks_handler};
pub use logout::{LogoutState, REFRESH_TOKEN_HEADER, logout_handler};
pub use token::{TokenState, refresh_handler, token_handler};
pub use users::{UsersState, me_handler, register_handler};
