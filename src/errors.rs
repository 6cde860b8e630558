//! Error types for request-store
//!
//! Fetch failures are not represented here: they are the caller's own error
//! type and live in the record's `error` field. `StoreError` only covers misuse
//! of the store itself.

use crate::key::CacheKey;

/// Errors raised by the store when a request cannot be attached to a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to derive cache key: {0}")]
    KeySerialization(String),
    #[error("Cache key {key} is already bound to a different value type")]
    TypeMismatch { key: CacheKey },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::KeySerialization(err.to_string())
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_names_the_key() {
        let key = CacheKey::from_raw(r#"["prices",["BTCUSDT"]]"#);
        let err = StoreError::TypeMismatch { key };
        assert_eq!(
            err.to_string(),
            r#"Cache key ["prices",["BTCUSDT"]] is already bound to a different value type"#
        );
    }
}
