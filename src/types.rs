//! Common types and aliases used throughout request-store

use serde::Serialize;

/// Common trait bounds for fetch arguments
///
/// Arguments must be serializable because the cache key is derived from their
/// canonical serialization.
pub trait FetchArgsBounds:
    Clone + Serialize + std::fmt::Debug + Send + Sync + 'static
{
}
impl<T> FetchArgsBounds for T where
    T: Clone + Serialize + std::fmt::Debug + Send + Sync + 'static
{
}

/// Common trait bounds for fetch output types
pub trait FetchOutputBounds: Clone + Send + Sync + 'static {}
impl<T> FetchOutputBounds for T where T: Clone + Send + Sync + 'static {}

/// Common trait bounds for fetch error types
pub trait FetchErrorBounds: Clone + Send + Sync + 'static {}
impl<T> FetchErrorBounds for T where T: Clone + Send + Sync + 'static {}
