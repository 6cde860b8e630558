//! # Request store
//!
//! [`RequestStore`] owns every request record and the lifecycle table that
//! keeps per-key freshness polls alive. It is an explicit value: build one at
//! startup and pass clones (cheap, `Arc` inside) to whoever needs it. Separate
//! stores share nothing, which is what tests rely on for isolation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use request_store::prelude::*;
//!
//! #[fetcher(revalidate = "10s")]
//! async fn last_price(symbol: String) -> Result<String, String> {
//!     Ok(format!("{symbol}: 64000.00"))
//! }
//!
//! # async fn demo() -> Result<(), StoreError> {
//! let store = RequestStore::new(StoreConfig::default());
//! let mut quote = store.subscribe(last_price(), "BTCUSDT".to_string())?;
//! let snapshot = quote.changed().await;
//! println!("loading: {}, data: {:?}", snapshot.is_loading(), snapshot.data());
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod tasks;

use std::{
    any::Any,
    fmt,
    sync::Arc,
    time::Duration,
};

use crate::{
    errors::{StoreError, StoreResult},
    fetcher::Fetcher,
    key::CacheKey,
    lifecycle::RefCountedLifecycle,
    param_utils::IntoFetchArgs,
    record::RequestRecord,
    registry::KeyedRegistry,
    state::RequestSnapshot,
    subscription::Subscription,
    types::{FetchErrorBounds, FetchOutputBounds},
};

/// Default period of the per-key freshness poll
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(500);

/// Default delay between the last subscriber leaving and the poll stopping
pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_millis(1000);

/// Configuration for a [`RequestStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    poll_period: Duration,
    teardown_grace: Duration,
}

impl StoreConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self {
            poll_period: DEFAULT_POLL_PERIOD,
            teardown_grace: DEFAULT_TEARDOWN_GRACE,
        }
    }

    /// How often each subscribed key is checked for staleness.
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    /// How long a key's poll survives after its last subscriber detaches.
    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    pub fn poll_period(&self) -> Duration {
        self.poll_period
    }

    pub fn teardown_grace(&self) -> Duration {
        self.teardown_grace
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

type ErasedRecord = Arc<dyn Any + Send + Sync>;

struct StoreInner {
    config: StoreConfig,
    records: KeyedRegistry<CacheKey, ErasedRecord>,
    lifecycle: RefCountedLifecycle,
}

/// Owner of all request records and freshness polls.
#[derive(Clone)]
pub struct RequestStore {
    inner: Arc<StoreInner>,
}

impl RequestStore {
    /// Construct a new store using the provided configuration.
    pub fn new(config: StoreConfig) -> Self {
        let lifecycle = RefCountedLifecycle::new(config.teardown_grace);
        Self {
            inner: Arc::new(StoreInner {
                config,
                records: KeyedRegistry::new(),
                lifecycle,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Lifecycle table backing the freshness polls.
    pub fn lifecycle(&self) -> &RefCountedLifecycle {
        &self.inner.lifecycle
    }

    /// The record for `key`, created unfetched on first access.
    ///
    /// Fails if `key` was first used with a different value or error type.
    pub fn record<T, E>(&self, key: &CacheKey) -> StoreResult<Arc<RequestRecord<T, E>>>
    where
        T: FetchOutputBounds,
        E: FetchErrorBounds,
    {
        let erased = self.inner.records.get(key, |key| {
            crate::debug_log!("📦 [RECORD] Created record for key: {}", key);
            Arc::new(RequestRecord::<T, E>::new(key.clone())) as ErasedRecord
        });
        erased
            .downcast::<RequestRecord<T, E>>()
            .map_err(|_| StoreError::TypeMismatch { key: key.clone() })
    }

    /// Attach a subscriber to the record behind `fetcher` and `args`.
    ///
    /// Attaching immediately runs a coordinator check (fetching if the record
    /// is unfetched, due or stale) and keeps the key's freshness poll alive
    /// until the returned [`Subscription`] is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F, A>(
        &self,
        fetcher: F,
        args: A,
    ) -> StoreResult<Subscription<F::Output, F::Error>>
    where
        F: Fetcher<A::Args>,
        A: IntoFetchArgs,
    {
        let args = args.into_args();
        let key = fetcher.key(&args)?;
        let record = self.record::<F::Output, F::Error>(&key)?;
        let interval = fetcher.revalidate_interval();
        record.observe_interval(interval);

        let poll_period = self.inner.config.poll_period;
        let poll_record = record.clone();
        let lease = self.inner.lifecycle.activate(key.as_str(), move |_| {
            Some(tasks::spawn_freshness_poll(poll_record, poll_period))
        });

        let driver = coordinator::spawn_driver(record.clone(), fetcher, args, interval);
        crate::debug_log!("🔗 [SUBSCRIBE] Subscriber attached to key: {}", key);
        Ok(Subscription::new(record, driver, lease))
    }

    /// Mark the record behind `fetcher` and `args` as due for a refetch.
    pub fn refresh<F, A>(&self, fetcher: &F, args: A) -> StoreResult<()>
    where
        F: Fetcher<A::Args>,
        A: IntoFetchArgs,
    {
        let key = fetcher.key(&args.into_args())?;
        self.record::<F::Output, F::Error>(&key)?.refresh();
        Ok(())
    }

    /// Current snapshot of the record behind `fetcher` and `args`.
    pub fn snapshot<F, A>(
        &self,
        fetcher: &F,
        args: A,
    ) -> StoreResult<Arc<RequestSnapshot<F::Output, F::Error>>>
    where
        F: Fetcher<A::Args>,
        A: IntoFetchArgs,
    {
        let key = fetcher.key(&args.into_args())?;
        Ok(self.record::<F::Output, F::Error>(&key)?.snapshot())
    }

    /// Number of records created so far.
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner.records.keys()
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl fmt::Debug for RequestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestStore")
            .field("config", &self.inner.config)
            .field("records", &self.inner.records.len())
            .finish()
    }
}
