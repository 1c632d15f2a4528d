//! Refresh credential domain type.
//!
//! A refresh credential is an opaque random string that can be exchanged
//! once for a new access/refresh pair. Credentials descended from one login
//! share a `family_id`; presenting an already-used member is the theft
//! signal that kills the whole family.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::storage::Expiring;

/// Refresh credential held by the rotation ledger.
///
/// Lifecycle is `issued -> used`, and `used` is terminal. Used rows are kept
/// until they expire so a replay can still be recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshCredential {
    /// The opaque token value handed to the client.
    pub token: String,

    /// Owner of the credential.
    pub username: String,

    /// When this credential stops being exchangeable.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Set once the credential has been rotated or its family invalidated.
    pub used: bool,

    /// Token of the first credential issued at login.
    pub family_id: String,
}

impl RefreshCredential {
    /// Creates an unused credential.
    ///
    /// Without an inherited family the credential starts its own family.
    #[must_use]
    pub fn new(
        token: String,
        username: impl Into<String>,
        expires_at: OffsetDateTime,
        family_id: Option<String>,
    ) -> Self {
        let family_id = family_id.unwrap_or_else(|| token.clone());
        Self {
            token,
            username: username.into(),
            expires_at,
            used: false,
            family_id,
        }
    }

    /// Returns `true` if this credential started its family.
    #[must_use]
    pub fn is_family_root(&self) -> bool {
        self.token == self.family_id
    }

    /// Generate a cryptographically secure random token.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate_token() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl Expiring for RefreshCredential {
    fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }
}
