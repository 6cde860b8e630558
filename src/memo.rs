//! Keyed memoization within a dependency epoch.

use std::collections::HashMap;

/// Caches one generated value per string key until its dependencies change.
///
/// Useful for handing out stable per-key callbacks: the same key yields the
/// same value (e.g. the same `Arc` closure) for as long as the dependency set
/// is unchanged. Changing the dependencies starts a new epoch and drops every
/// cached value at once; there is no per-key eviction.
pub struct KeyMemo<D, V, G> {
    deps: D,
    epoch: u64,
    values: HashMap<String, V>,
    generate: G,
}

impl<D, V, G> KeyMemo<D, V, G>
where
    D: PartialEq,
    V: Clone,
    G: Fn(&str) -> V,
{
    pub fn new(deps: D, generate: G) -> Self {
        Self {
            deps,
            epoch: 0,
            values: HashMap::new(),
            generate,
        }
    }

    /// Cached value for `key` in the current epoch, generating it on first use.
    pub fn get(&mut self, key: &str) -> V {
        if let Some(value) = self.values.get(key) {
            return value.clone();
        }
        let value = (self.generate)(key);
        self.values.insert(key.to_owned(), value.clone());
        value
    }

    /// Declare the current dependencies. Returns true if they differ from the
    /// previous ones, in which case a new epoch starts with an empty cache.
    pub fn set_deps(&mut self, deps: D) -> bool {
        if self.deps == deps {
            return false;
        }
        self.deps = deps;
        self.epoch += 1;
        self.values.clear();
        crate::debug_log!("🗑️ [KEY-MEMO] Dependencies changed, starting epoch {}", self.epoch);
        true
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
