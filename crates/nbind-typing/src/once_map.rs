use std::hash::Hash;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Concurrent create-if-absent map.
///
/// Lookups take a shared read lock only. A miss computes the value without
/// holding any lock, then inserts it unless another thread got there first;
/// either way every caller receives the value that ended up in the map.
/// Entries are never removed.
pub struct OnceMap<K, V> {
    map: RwLock<FxHashMap<K, V>>,
}

impl<K, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            map: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<K: Eq + Hash, V: Clone> OnceMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.map.read().get(key).cloned()
    }

    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        make: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = make()?;
        let mut map = self.map.write();
        Ok(map.entry(key).or_insert(value).clone())
    }

    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = make();
        let mut map = self.map.write();
        map.entry(key).or_insert(value).clone()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}
