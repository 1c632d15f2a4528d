//! Request identity resolution for rate limiting.

use std::net::SocketAddr;

use axum::http::HeaderMap;

use super::Tier;
use crate::types::{ROLE_ADMIN, satisfies_role};

/// Key used when no client address can be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// The bucket a request is charged to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub tier: Tier,
    pub key: String,
}

impl Identity {
    /// Identity for an authenticated subject; admins get their own tier.
    #[must_use]
    pub fn authenticated(subject: &str, roles: &[String]) -> Self {
        let tier = if satisfies_role(roles, ROLE_ADMIN) {
            Tier::Admin
        } else {
            Tier::User
        };
        Self {
            tier,
            key: subject.to_string(),
        }
    }

    /// Identity for an unauthenticated caller, keyed by client IP.
    #[must_use]
    pub fn anonymous(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self {
            tier: Tier::Anonymous,
            key: client_ip(headers, peer),
        }
    }
}

/// Client address: first `X-Forwarded-For` entry, then the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ROLE_USER;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_takes_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_falls_back_to_peer_then_unknown() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.1:443".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.1");
        assert_eq!(client_ip(&headers, None), "unknown");
    }

    #[test]
    fn test_authenticated_tier_follows_roles() {
        let admin = Identity::authenticated("root", &[ROLE_ADMIN.to_string()]);
        assert_eq!(admin.tier, Tier::Admin);
        assert_eq!(admin.key, "root");

        let user = Identity::authenticated("alice", &[ROLE_USER.to_string()]);
        assert_eq!(user.tier, Tier::User);

        let roleless = Identity::authenticated("ghost", &[]);
        assert_eq!(roleless.tier, Tier::User);
    }
}
