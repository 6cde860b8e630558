//! # Fetchers
//!
//! A [`Fetcher`] is the caller-supplied asynchronous operation behind a cache
//! key. The store decides *when* it runs; the fetcher only knows *how* to
//! produce a value.
//!
//! ## Example
//!
//! ```rust,no_run
//! use request_store::prelude::*;
//! use std::time::Duration;
//!
//! #[derive(Clone)]
//! struct LastPrice;
//!
//! impl Fetcher<String> for LastPrice {
//!     type Output = f64;
//!     type Error = String;
//!
//!     fn run(&self, symbol: String) -> impl std::future::Future<Output = Result<f64, String>> + Send {
//!         async move { if symbol.is_empty() { Err("no symbol".into()) } else { Ok(42.0) } }
//!     }
//!
//!     fn revalidate_interval(&self) -> Duration {
//!         Duration::from_secs(10)
//!     }
//! }
//! ```
//!
//! Most fetchers are written with the [`fetcher`](crate::prelude::fetcher)
//! attribute instead.

use std::{future::Future, time::Duration};

use crate::{
    errors::StoreResult,
    key::CacheKey,
    types::{FetchArgsBounds, FetchErrorBounds, FetchOutputBounds},
};

/// A keyed asynchronous data source
///
/// `Args` is the ordered argument tuple the fetch takes; it is also what the
/// cache key is derived from.
pub trait Fetcher<Args = ()>: Clone + Send + Sync + 'static
where
    Args: FetchArgsBounds,
{
    /// The type of data returned on success
    type Output: FetchOutputBounds;
    /// The failure payload, stored verbatim in the record
    type Error: FetchErrorBounds;

    /// Perform one fetch. Invoked at most once per cycle, never retried.
    fn run(&self, args: Args) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;

    /// Namespace separating this fetcher's keys from other fetchers taking the
    /// same arguments. Defaults to the type name.
    fn namespace(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Cache key for `args`: canonical serialization of `(namespace, args)`.
    fn key(&self, args: &Args) -> StoreResult<CacheKey> {
        CacheKey::new(self.namespace(), args)
    }

    /// How long a successful outcome stays fresh.
    ///
    /// Zero means fetch once and only refetch on an explicit `refresh()`.
    fn revalidate_interval(&self) -> Duration {
        Duration::ZERO
    }
}
