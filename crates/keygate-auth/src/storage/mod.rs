//! Credential storage.
//!
//! The revocation list and the rotation ledger both sit on top of a
//! [`CredentialStore`]: a concurrent string-keyed map whose single-key
//! operations are atomic. Only an in-memory implementation ships
//! ([`MemoryStore`]); persistent backends implement the same trait.
//!
//! # Atomicity
//!
//! - [`CredentialStore::update`] runs its closure while holding the entry's
//!   lock, so a check-then-mark done inside it cannot interleave with another
//!   writer of the same key.
//! - [`CredentialStore::upsert`] decides between insert and merge under the
//!   same lock, so concurrent writers of an absent key never overwrite each
//!   other.
//! - [`CredentialStore::retain`] and [`CredentialStore::for_each_mut`] visit
//!   entries shard by shard; they tolerate concurrent inserts and removals
//!   but give no cross-key snapshot.

mod memory;

pub use memory::MemoryStore;

use time::OffsetDateTime;

/// A stored value with a natural expiry instant.
pub trait Expiring {
    /// The instant after which the value is meaningless.
    fn expires_at(&self) -> OffsetDateTime;

    /// Returns `true` if the value is past its expiry at `now`.
    fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at() < now
    }
}

/// Concurrent key-value map used by the credential services.
///
/// All methods are synchronous and never block on I/O.
pub trait CredentialStore<V>: Send + Sync
where
    V: Clone + Send + Sync,
{
    /// Inserts or replaces the value for `key`.
    fn insert(&self, key: String, value: V);

    /// Returns a clone of the value stored for `key`.
    fn get(&self, key: &str) -> Option<V>;

    /// Removes and returns the value for `key`.
    fn remove(&self, key: &str) -> Option<V>;

    /// Removes the value for `key` only if `predicate` holds for it.
    ///
    /// Returns `true` if an entry was removed.
    fn remove_if(&self, key: &str, predicate: &dyn Fn(&V) -> bool) -> bool;

    /// Applies `f` to the value for `key` under the entry lock.
    ///
    /// Returns `false` if the key is absent.
    fn update(&self, key: &str, f: &mut dyn FnMut(&mut V)) -> bool;

    /// Inserts `value` if `key` is absent, otherwise applies `merge` to the
    /// stored value. Both branches run under the entry lock.
    fn upsert(&self, key: String, value: V, merge: &mut dyn FnMut(&mut V));

    /// Applies `f` to every entry.
    fn for_each_mut(&self, f: &mut dyn FnMut(&str, &mut V));

    /// Keeps only the entries for which `keep` returns `true`.
    ///
    /// Returns the number of entries removed.
    fn retain(&self, keep: &mut dyn FnMut(&str, &mut V) -> bool) -> usize;

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Returns `true` if the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes every entry that has expired at `now`.
///
/// Returns the number of entries removed.
pub fn purge_expired<V>(store: &dyn CredentialStore<V>, now: OffsetDateTime) -> usize
where
    V: Expiring + Clone + Send + Sync,
{
    store.retain(&mut |_, value| !value.is_expired_at(now))
}
