//! Lazily populated per-key containers.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Creates one container per key on first access and keeps it for the
/// registry's lifetime.
///
/// There is no removal: a container handed out once is the container every
/// later caller of the same key receives.
#[derive(Debug)]
pub struct KeyedRegistry<K, C> {
    entries: Mutex<HashMap<K, C>>,
}

impl<K, C> Default for KeyedRegistry<K, C> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, C> KeyedRegistry<K, C>
where
    K: Eq + Hash + Clone,
    C: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the container for `key`, building it with `factory` if this is
    /// the first request for that key.
    ///
    /// The factory runs under the registry lock, so it runs at most once per key
    /// even when several callers race on the same key.
    pub fn get<F>(&self, key: &K, factory: F) -> C
    where
        F: FnOnce(&K) -> C,
    {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(key) {
            return existing.clone();
        }
        let created = factory(key);
        entries.insert(key.clone(), created.clone());
        created
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, C>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
