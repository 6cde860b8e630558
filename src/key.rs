//! Canonical cache keys

use std::{fmt, sync::Arc};

use serde::Serialize;

use crate::errors::StoreResult;

/// Canonical identity of one request record.
///
/// A key is the compact JSON encoding of `(namespace, args)`. Two keys are equal
/// exactly when their encodings are equal, so argument order matters and
/// `("BTCUSDT", 1)` and `(1, "BTCUSDT")` address different records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Build the key for `args` under `namespace`.
    pub fn new<A: Serialize + ?Sized>(namespace: &str, args: &A) -> StoreResult<Self> {
        let encoded = serde_json::to_string(&(namespace, args))?;
        Ok(Self(encoded.into()))
    }

    /// Wrap an already canonical string.
    pub fn from_raw(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn encodes_namespace_and_ordered_args() {
        let key = CacheKey::new("ticker", &("/api/v3/ticker/24hr", "BTCUSDT")).unwrap();
        assert_eq!(key.as_str(), r#"["ticker",["/api/v3/ticker/24hr","BTCUSDT"]]"#);

        let swapped = CacheKey::new("ticker", &("BTCUSDT", "/api/v3/ticker/24hr")).unwrap();
        assert_ne!(key, swapped);
    }

    #[test]
    fn equal_args_give_equal_keys() {
        let a = CacheKey::new("ticker", &("ETHUSDT", Option::<u32>::None)).unwrap();
        let b = CacheKey::new("ticker", &("ETHUSDT", Option::<u32>::None)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), r#"["ticker",["ETHUSDT",null]]"#);
    }

    #[test]
    fn namespaces_separate_identical_args() {
        let a = CacheKey::new("price", &"BTCUSDT").unwrap();
        let b = CacheKey::new("volume", &"BTCUSDT").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn non_string_map_keys_fail_to_serialize() {
        let mut args = BTreeMap::new();
        args.insert((1, 2), "pair");
        assert!(CacheKey::new("bad", &args).is_err());
    }
}
