//! Access credential revocation list.
//!
//! Logout records the credential's `jti` together with the credential's own
//! expiry. An entry is meaningful only until that instant; afterwards the
//! credential would fail the lifetime check anyway, so the entry is treated
//! as absent and eventually dropped, either lazily on lookup or by the
//! periodic sweep started with [`RevocationList::spawn_sweeper`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::config::ConfigError;
use crate::storage::{CredentialStore, Expiring, MemoryStore, purge_expired};

/// A revoked credential identifier and the instant it stops mattering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    /// The revoked `jti`.
    pub id: String,

    /// Natural expiry of the revoked credential.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Expiring for RevocationEntry {
    fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }
}

/// Set of revoked access credential ids with self-cleaning memory.
pub struct RevocationList {
    store: Arc<dyn CredentialStore<RevocationEntry>>,
    clock: SharedClock,
}

impl RevocationList {
    /// Creates a revocation list over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore<RevocationEntry>>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Creates a revocation list backed by an empty in-memory store.
    #[must_use]
    pub fn in_memory(clock: SharedClock) -> Self {
        Self::new(Arc::new(MemoryStore::new()), clock)
    }

    /// Revokes `id` until `natural_expiry`.
    ///
    /// Does nothing if either argument is absent. Revoking an id twice keeps
    /// the later expiry.
    pub fn revoke(&self, id: Option<&str>, natural_expiry: Option<OffsetDateTime>) {
        let (Some(id), Some(expires_at)) = (id, natural_expiry) else {
            return;
        };

        let entry = RevocationEntry {
            id: id.to_string(),
            expires_at,
        };
        self.store.upsert(id.to_string(), entry, &mut |current| {
            if expires_at > current.expires_at {
                current.expires_at = expires_at;
            }
        });

        info!(jti = %id, expires_at = %expires_at, "Access token revoked");
    }

    /// Returns `true` if `id` is revoked and the entry has not yet expired.
    ///
    /// An expired entry is removed on the way out.
    pub fn is_revoked(&self, id: &str) -> bool {
        let Some(entry) = self.store.get(id) else {
            return false;
        };

        let now = self.clock.now();
        if entry.is_expired_at(now) {
            self.store.remove_if(id, &|current| current.is_expired_at(now));
            return false;
        }

        true
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let removed = purge_expired(self.store.as_ref(), self.clock.now());
        debug!(removed, remaining = self.store.len(), "Revocation list swept");
        removed
    }

    /// Number of stored entries, including not-yet-swept expired ones.
    #[must_use]
    pub fn size(&self) -> usize {
        self.store.len()
    }

    /// Starts a background task that calls [`sweep`](Self::sweep) every
    /// `every`, beginning one period from now.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `every` is zero.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> Result<SweepHandle, ConfigError> {
        if every.is_zero() {
            return Err(ConfigError::InvalidValue(
                "revocation sweep interval must be positive".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let list = Arc::clone(self);

        let task = tokio::spawn(async move {
            info!(interval_secs = every.as_secs(), "Revocation sweeper started");

            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        list.sweep();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Revocation sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        Ok(SweepHandle {
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle to a running sweeper task.
///
/// Dropping the handle also stops the task, since the shutdown channel closes.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Signals the sweeper to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Revocation sweeper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use time::macros::datetime;

    const START: OffsetDateTime = datetime!(2025-01-01 12:00 UTC);

    fn list() -> (Arc<ManualClock>, RevocationList) {
        let clock = Arc::new(ManualClock::new(START));
        let list = RevocationList::in_memory(clock.clone());
        (clock, list)
    }

    #[test]
    fn test_revoked_until_natural_expiry() {
        let (clock, list) = list();
        list.revoke(Some("jti-1"), Some(START + time::Duration::minutes(15)));

        assert!(list.is_revoked("jti-1"));

        clock.advance(time::Duration::minutes(15));
        assert!(list.is_revoked("jti-1"));

        clock.advance(time::Duration::seconds(1));
        assert!(!list.is_revoked("jti-1"));
        assert_eq!(list.size(), 0, "expired entry is removed lazily");
    }

    #[test]
    fn test_revoke_ignores_missing_arguments() {
        let (_, list) = list();
        list.revoke(None, Some(START));
        list.revoke(Some("jti"), None);
        assert_eq!(list.size(), 0);
    }

    #[test]
    fn test_unknown_id_is_not_revoked() {
        let (_, list) = list();
        assert!(!list.is_revoked("nope"));
    }

    #[test]
    fn test_revoke_twice_keeps_later_expiry() {
        let (clock, list) = list();
        list.revoke(Some("jti"), Some(START + time::Duration::hours(2)));
        list.revoke(Some("jti"), Some(START + time::Duration::hours(1)));

        clock.advance(time::Duration::minutes(90));
        assert!(list.is_revoked("jti"));
        assert_eq!(list.size(), 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (clock, list) = list();
        list.revoke(Some("short"), Some(START + time::Duration::minutes(5)));
        list.revoke(Some("long"), Some(START + time::Duration::hours(5)));

        clock.advance(time::Duration::hours(1));
        assert_eq!(list.sweep(), 1);
        assert_eq!(list.size(), 1);
        assert!(list.is_revoked("long"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_periodically_and_stops() {
        let (clock, list) = list();
        let list = Arc::new(list);
        list.revoke(Some("jti"), Some(START + time::Duration::minutes(1)));
        clock.advance(time::Duration::minutes(2));

        let handle = list.spawn_sweeper(Duration::from_secs(3600)).unwrap();
        tokio::time::sleep(Duration::from_secs(3601)).await;
        tokio::task::yield_now().await;
        assert_eq!(list.size(), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_rejects_zero_interval() {
        let (_, list) = list();
        let list = Arc::new(list);

        let err = list.spawn_sweeper(Duration::ZERO).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_concurrent_revokes_keep_latest_expiry() {
        let (clock, list) = list();
        let list = Arc::new(list);

        let handles: Vec<_> = (1..=8)
            .map(|hours| {
                let list = Arc::clone(&list);
                std::thread::spawn(move || {
                    list.revoke(Some("jti"), Some(START + time::Duration::hours(hours)));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(list.size(), 1);
        clock.advance(time::Duration::hours(7) + time::Duration::minutes(30));
        assert!(list.is_revoked("jti"));
    }
}
