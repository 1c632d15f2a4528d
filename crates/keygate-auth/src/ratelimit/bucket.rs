//! Interval-refill token bucket.

use time::{Duration, OffsetDateTime};

/// A token bucket that returns to full capacity once per elapsed window.
///
/// Refill is batched, not smoothed: a caller that drains the bucket waits
/// for the next window boundary, measured from the bucket's creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateBucket {
    capacity: u32,
    refill: u32,
    window: Duration,
    tokens: u32,
    last_refill: OffsetDateTime,
}

impl RateBucket {
    /// Creates a full bucket that refills `capacity` tokens per `window`.
    #[must_use]
    pub fn new(capacity: u32, window: Duration, now: OffsetDateTime) -> Self {
        Self {
            capacity,
            refill: capacity,
            window,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Credits every window that has fully elapsed since the last refill.
    fn refill(&mut self, now: OffsetDateTime) {
        let window = self.window.whole_nanoseconds();
        if window <= 0 {
            self.tokens = self.capacity;
            self.last_refill = now;
            return;
        }

        let elapsed = (now - self.last_refill).whole_nanoseconds();
        if elapsed < window {
            return;
        }

        let periods = elapsed / window;
        let credited = u32::try_from(periods)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.refill);
        self.tokens = self.tokens.saturating_add(credited).min(self.capacity);

        let advance = i64::try_from(periods * window).unwrap_or(i64::MAX);
        self.last_refill += Duration::nanoseconds(advance);
    }

    /// Refills, then takes one token if available.
    pub fn try_consume(&mut self, now: OffsetDateTime) -> bool {
        self.refill(now);
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    /// Tokens left after the last operation.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.tokens
    }

    /// Bucket capacity.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Time until the next window boundary, never negative.
    #[must_use]
    pub fn until_refill(&self, now: OffsetDateTime) -> Duration {
        let next = self.last_refill + self.window;
        if next > now { next - now } else { Duration::ZERO }
    }
}
