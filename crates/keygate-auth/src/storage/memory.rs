//! DashMap-backed credential store.

use dashmap::DashMap;

use super::CredentialStore;

/// In-memory [`CredentialStore`] built on a sharded concurrent map.
///
/// State is volatile and lost on restart.
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: DashMap<String, V>,
}

impl<V> MemoryStore<V> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CredentialStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn insert(&self, key: String, value: V) {
        self.entries.insert(key, value);
    }

    fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    fn remove_if(&self, key: &str, predicate: &dyn Fn(&V) -> bool) -> bool {
        self.entries
            .remove_if(key, |_, value| predicate(value))
            .is_some()
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(&mut V)) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    fn upsert(&self, key: String, value: V, merge: &mut dyn FnMut(&mut V)) {
        self.entries
            .entry(key)
            .and_modify(|current| merge(current))
            .or_insert(value);
    }

    fn for_each_mut(&self, f: &mut dyn FnMut(&str, &mut V)) {
        for mut entry in self.entries.iter_mut() {
            let (key, value) = entry.pair_mut();
            f(key.as_str(), value);
        }
    }

    fn retain(&self, keep: &mut dyn FnMut(&str, &mut V) -> bool) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, value| {
            let kept = keep(key.as_str(), value);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
