//! Refresh credential rotation with family-based reuse detection.
//!
//! Every successful [`RotationLedger::rotate`] marks the presented credential
//! used and issues a successor in the same family. A used credential is never
//! exchangeable again; presenting one means two parties hold the same family
//! (the legitimate client and a thief, in some order), so the ledger kills
//! the whole family and reports [`RotationError::ReuseDetected`].
//!
//! Used credentials stay in the store until they expire so that a replay
//! is recognised as reuse rather than as an unknown token.

use std::sync::Arc;

use time::Duration;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::error::RotationError;
use crate::storage::{CredentialStore, MemoryStore, purge_expired};
use crate::types::RefreshCredential;

/// Default refresh credential lifetime.
pub const DEFAULT_REFRESH_LIFETIME: Duration = Duration::days(7);

/// Outcome of the atomic check-and-mark step.
enum Step {
    Rotated { username: String, family_id: String },
    Reused { family_id: String },
    Expired,
}

/// Owner of all refresh credentials.
pub struct RotationLedger {
    store: Arc<dyn CredentialStore<RefreshCredential>>,
    clock: SharedClock,
    lifetime: Duration,
}

impl RotationLedger {
    /// Creates a ledger over the given store.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore<RefreshCredential>>,
        clock: SharedClock,
        lifetime: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            lifetime,
        }
    }

    /// Creates a ledger backed by an empty in-memory store.
    #[must_use]
    pub fn in_memory(clock: SharedClock, lifetime: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), clock, lifetime)
    }

    /// Issues a credential that starts a new family.
    pub fn create(&self, username: &str) -> RefreshCredential {
        self.issue(username, None)
    }

    fn issue(&self, username: &str, family_id: Option<String>) -> RefreshCredential {
        let now = self.clock.now();
        let swept = purge_expired(self.store.as_ref(), now);
        if swept > 0 {
            debug!(removed = swept, "Expired refresh tokens swept");
        }

        let credential = RefreshCredential::new(
            RefreshCredential::generate_token(),
            username,
            now + self.lifetime,
            family_id,
        );
        self.store
            .insert(credential.token.clone(), credential.clone());
        credential
    }

    /// Exchanges `token` for a successor in the same family.
    ///
    /// # Errors
    ///
    /// - [`RotationError::NotFound`] if the token is unknown
    /// - [`RotationError::ReuseDetected`] if it was already used; the whole
    ///   family is invalidated before returning
    /// - [`RotationError::Expired`] if it is unused but past its expiry
    pub fn rotate(&self, token: &str) -> Result<RefreshCredential, RotationError> {
        let now = self.clock.now();
        let mut step = None;

        // Check and mark under the entry lock so only one concurrent caller
        // can observe `used == false`.
        self.store.update(token, &mut |credential| {
            step = Some(if credential.used {
                Step::Reused {
                    family_id: credential.family_id.clone(),
                }
            } else if credential.expires_at < now {
                Step::Expired
            } else {
                credential.used = true;
                Step::Rotated {
                    username: credential.username.clone(),
                    family_id: credential.family_id.clone(),
                }
            });
        });

        match step {
            None => Err(RotationError::NotFound),
            Some(Step::Expired) => Err(RotationError::Expired),
            Some(Step::Reused { family_id }) => {
                let invalidated = self.invalidate_family(&family_id);
                warn!(
                    family_id = %family_id,
                    invalidated,
                    "Refresh token reuse detected, token family invalidated"
                );
                Err(RotationError::ReuseDetected)
            }
            Some(Step::Rotated {
                username,
                family_id,
            }) => {
                let successor = self.issue(&username, Some(family_id));
                debug!(username = %username, "Refresh token rotated");
                Ok(successor)
            }
        }
    }

    /// Marks every member of `family_id` used. Idempotent.
    ///
    /// Returns how many credentials changed state. Members created
    /// concurrently with the scan may be missed.
    pub fn invalidate_family(&self, family_id: &str) -> usize {
        let mut invalidated = 0;
        self.store.for_each_mut(&mut |_, credential| {
            if credential.family_id == family_id && !credential.used {
                credential.used = true;
                invalidated += 1;
            }
        });
        invalidated
    }

    /// Read-only lookup.
    #[must_use]
    pub fn find_by_token(&self, token: &str) -> Option<RefreshCredential> {
        self.store.get(token)
    }

    /// Drops every expired credential. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        purge_expired(self.store.as_ref(), self.clock.now())
    }

    /// Number of stored credentials, used and unused.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if the ledger holds no credentials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Barrier;
    use std::thread;

    fn ledger() -> (Arc<ManualClock>, RotationLedger) {
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = RotationLedger::in_memory(clock.clone(), DEFAULT_REFRESH_LIFETIME);
        (clock, ledger)
    }

    #[test]
    fn test_create_starts_family() {
        let (clock, ledger) = ledger();
        let credential = ledger.create("alice");

        assert_eq!(credential.username, "alice");
        assert_eq!(credential.family_id, credential.token);
        assert!(!credential.used);
        assert_eq!(credential.expires_at, clock.now() + Duration::days(7));
        assert_eq!(ledger.find_by_token(&credential.token), Some(credential));
    }

    #[test]
    fn test_rotate_issues_successor_in_same_family() {
        let (_, ledger) = ledger();
        let first = ledger.create("alice");

        let second = ledger.rotate(&first.token).unwrap();
        assert_ne!(second.token, first.token);
        assert_eq!(second.family_id, first.family_id);
        assert_eq!(second.username, "alice");
        assert!(ledger.find_by_token(&first.token).unwrap().used);
    }

    #[test]
    fn test_replayed_token_is_reuse_not_not_found() {
        let (_, ledger) = ledger();
        let first = ledger.create("alice");
        ledger.rotate(&first.token).unwrap();

        assert_eq!(
            ledger.rotate(&first.token).unwrap_err(),
            RotationError::ReuseDetected
        );
    }

    #[test]
    fn test_reuse_cascades_to_whole_family() {
        let (_, ledger) = ledger();
        let first = ledger.create("alice");
        let second = ledger.rotate(&first.token).unwrap();
        let third = ledger.rotate(&second.token).unwrap();
        let unrelated = ledger.create("bob");

        assert_eq!(
            ledger.rotate(&second.token).unwrap_err(),
            RotationError::ReuseDetected
        );

        assert!(ledger.find_by_token(&third.token).unwrap().used);
        assert_eq!(
            ledger.rotate(&third.token).unwrap_err(),
            RotationError::ReuseDetected
        );
        assert!(!ledger.find_by_token(&unrelated.token).unwrap().used);
    }

    #[test]
    fn test_unknown_token_not_found() {
        let (_, ledger) = ledger();
        assert_eq!(
            ledger.rotate("does-not-exist").unwrap_err(),
            RotationError::NotFound
        );
    }

    #[test]
    fn test_expired_token_does_not_invalidate_family() {
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = RotationLedger::in_memory(clock.clone(), Duration::hours(1));
        let first = ledger.create("alice");

        clock.advance(Duration::hours(1) + Duration::seconds(1));
        assert_eq!(
            ledger.rotate(&first.token).unwrap_err(),
            RotationError::Expired
        );
        assert!(!ledger.find_by_token(&first.token).unwrap().used);
    }

    #[test]
    fn test_invalidate_family_is_idempotent() {
        let (_, ledger) = ledger();
        let first = ledger.create("alice");
        let second = ledger.rotate(&first.token).unwrap();

        assert_eq!(ledger.invalidate_family(&first.family_id), 1);
        assert_eq!(ledger.invalidate_family(&first.family_id), 0);
        assert!(ledger.find_by_token(&second.token).unwrap().used);
    }

    #[test]
    fn test_create_sweeps_expired_rows() {
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = RotationLedger::in_memory(clock.clone(), Duration::hours(1));
        ledger.create("alice");
        ledger.create("bob");

        clock.advance(Duration::hours(2));
        ledger.create("carol");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_parallel_rotations_succeed_exactly_once() {
        let (_, ledger) = ledger();
        let ledger = Arc::new(ledger);
        let token = ledger.create("alice").token;

        const THREADS: usize = 16;
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                let token = token.clone();
                thread::spawn(move || {
                    barrier.wait();
                    ledger.rotate(&token)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| *e == RotationError::ReuseDetected)
        );
    }
}
