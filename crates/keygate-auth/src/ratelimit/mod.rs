//! Tiered request rate limiting.
//!
//! Every request is attributed to an [`Identity`]: anonymous callers by
//! client IP, authenticated callers by username, split into a user and an
//! admin tier by role. Each tier owns a [`BucketPool`] of interval-refill
//! [`RateBucket`]s.

mod bucket;
mod identity;
mod pool;

pub use bucket::RateBucket;
pub use identity::{Identity, client_ip};
pub use pool::{Admission, BucketPool};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use time::Duration;

use crate::clock::SharedClock;
use crate::config::RateLimitingConfig;

/// Identity class a request is limited under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    /// Unauthenticated, keyed by client IP.
    #[serde(rename = "IP")]
    Anonymous,
    /// Authenticated without `ROLE_ADMIN`.
    User,
    /// Authenticated with `ROLE_ADMIN`.
    Admin,
}

impl Tier {
    /// Label used in the `X-Rate-Limit-Type` header and error bodies.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "IP",
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capacity and refill window for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub capacity: u32,
    pub window: Duration,
}

impl TierPolicy {
    #[must_use]
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window }
    }

    /// Per-minute policy.
    #[must_use]
    pub fn per_minute(capacity: u32) -> Self {
        Self::new(capacity, Duration::minutes(1))
    }

    /// Human-readable rate such as `USER (200/min)`.
    #[must_use]
    pub fn describe(&self, tier: Tier) -> String {
        let per = match self.window.whole_seconds() {
            1 => "sec".to_string(),
            60 => "min".to_string(),
            3600 => "hour".to_string(),
            secs => format!("{secs}s"),
        };
        format!("{} ({}/{})", tier.as_str(), self.capacity, per)
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A token was consumed.
    Allowed {
        tier: Tier,
        remaining: u32,
    },
    /// The bucket is empty.
    Denied {
        tier: Tier,
        limit: String,
        retry_after_secs: u64,
    },
}

impl Decision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    #[must_use]
    pub fn tier(&self) -> Tier {
        match self {
            Self::Allowed { tier, .. } | Self::Denied { tier, .. } => *tier,
        }
    }
}

/// One bucket pool per tier, sharing a clock.
#[derive(Debug)]
pub struct RateLimiter {
    clock: SharedClock,
    anonymous: BucketPool,
    user: BucketPool,
    admin: BucketPool,
}

impl RateLimiter {
    /// Creates a limiter with explicit per-tier policies.
    #[must_use]
    pub fn new(
        clock: SharedClock,
        anonymous: TierPolicy,
        user: TierPolicy,
        admin: TierPolicy,
    ) -> Self {
        Self {
            clock,
            anonymous: BucketPool::new(anonymous),
            user: BucketPool::new(user),
            admin: BucketPool::new(admin),
        }
    }

    /// Creates a limiter from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitingConfig, clock: SharedClock) -> Self {
        let window = Duration::try_from(config.window).unwrap_or(Duration::MINUTE);
        Self::new(
            clock,
            TierPolicy::new(config.anonymous_per_window, window),
            TierPolicy::new(config.user_per_window, window),
            TierPolicy::new(config.admin_per_window, window),
        )
    }

    /// Shared-ownership constructor from configuration.
    #[must_use]
    pub fn shared(config: &RateLimitingConfig, clock: SharedClock) -> Arc<Self> {
        Arc::new(Self::from_config(config, clock))
    }

    fn pool(&self, tier: Tier) -> &BucketPool {
        match tier {
            Tier::Anonymous => &self.anonymous,
            Tier::User => &self.user,
            Tier::Admin => &self.admin,
        }
    }

    /// Consumes one token from `key`'s bucket in `tier`.
    pub fn check(&self, tier: Tier, key: &str) -> Decision {
        let pool = self.pool(tier);
        let admission = pool.admit(key, self.clock.now());
        if admission.allowed {
            Decision::Allowed {
                tier,
                remaining: admission.remaining,
            }
        } else {
            Decision::Denied {
                tier,
                limit: pool.policy().describe(tier),
                retry_after_secs: admission.retry_after_secs,
            }
        }
    }

    /// Returns `true` if a token was consumed.
    pub fn admit(&self, tier: Tier, key: &str) -> bool {
        self.check(tier, key).is_allowed()
    }

    /// Checks the bucket for a resolved identity.
    pub fn check_identity(&self, identity: &Identity) -> Decision {
        self.check(identity.tier, &identity.key)
    }

    /// Policy configured for `tier`.
    #[must_use]
    pub fn policy(&self, tier: Tier) -> &TierPolicy {
        self.pool(tier).policy()
    }

    /// Number of live buckets in `tier`.
    #[must_use]
    pub fn bucket_count(&self, tier: Tier) -> usize {
        self.pool(tier).len()
    }
}
