//! Lazily populated map of buckets for one tier.

use dashmap::DashMap;
use time::OffsetDateTime;

use super::TierPolicy;
use super::bucket::RateBucket;

/// Result of a single admission attempt against a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether a token was taken.
    pub allowed: bool,
    /// Tokens left in the bucket.
    pub remaining: u32,
    /// Seconds until the bucket next refills (rounded up).
    pub retry_after_secs: u64,
}

/// Buckets for one identity class, keyed by identity key.
///
/// Buckets are created on first use and never removed.
#[derive(Debug)]
pub struct BucketPool {
    policy: TierPolicy,
    buckets: DashMap<String, RateBucket>,
}

impl BucketPool {
    /// Creates an empty pool whose buckets follow `policy`.
    #[must_use]
    pub fn new(policy: TierPolicy) -> Self {
        Self {
            policy,
            buckets: DashMap::new(),
        }
    }

    /// Creates the bucket for `key` if needed and takes one token, as a
    /// single operation under the key's shard lock.
    pub fn admit(&self, key: &str, now: OffsetDateTime) -> Admission {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| RateBucket::new(self.policy.capacity, self.policy.window, now));

        let allowed = bucket.try_consume(now);
        let wait = bucket.until_refill(now);
        let mut retry_after_secs = u64::try_from(wait.whole_seconds()).unwrap_or(0);
        if wait.subsec_nanoseconds() > 0 {
            retry_after_secs += 1;
        }

        Admission {
            allowed,
            remaining: bucket.available(),
            retry_after_secs,
        }
    }

    /// The pool's policy.
    #[must_use]
    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// Number of buckets created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if no bucket has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
