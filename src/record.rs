//! # Request records
//!
//! One [`RequestRecord`] exists per cache key. It owns the fetch state machine:
//!
//! ```text
//!  Unfetched ──begin_cycle──▶ Fetching ──resolve──▶ Settled-Ok ──refresh──▶ Due
//!                                │                      │                    │
//!                                └──reject──▶ Settled-Err  ◀──reject── Refreshing ◀─begin_cycle─┘
//! ```
//!
//! All transitions happen inside one short critical section and publish a new
//! immutable [`RequestSnapshot`]. The `is_updating` flag is the per-key try-lock:
//! whoever flips it from false to true owns the next fetch.
//!
//! Cycles are identified by a [`CycleToken`]. Settling a cycle that is no
//! longer the one in flight is discarded, so an old fetch finishing late can
//! never overwrite newer state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::{
    sync::watch,
    time::{Duration, Instant},
};

use crate::{
    key::CacheKey,
    pending::{PendingResult, Resolver, pending_result},
    state::RequestSnapshot,
    types::{FetchErrorBounds, FetchOutputBounds},
};

/// Identity of one fetch cycle on one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CycleToken(u64);

/// Why a coordinator check did or did not start a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Another fetch already owns the key
    InFlight,
    /// Cached outcome is still fresh
    Fresh,
    /// A new cycle was started and the caller must perform the fetch
    Started(CycleToken),
}

struct RecordInner<T, E> {
    resolver: Option<Resolver<T, E>>,
    current_cycle: Option<CycleToken>,
    next_cycle: u64,
    /// Set by `refresh()` while a fetch is in flight; applied once it settles.
    deferred_refresh: bool,
    /// Shortest non-zero revalidate interval any subscriber asked for.
    revalidate_interval: Option<Duration>,
}

/// Per-key fetch state shared by every subscriber of that key
pub struct RequestRecord<T, E> {
    key: CacheKey,
    inner: Mutex<RecordInner<T, E>>,
    snapshots: watch::Sender<Arc<RequestSnapshot<T, E>>>,
}

impl<T, E> RequestRecord<T, E> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl<T, E> RequestRecord<T, E>
where
    T: FetchOutputBounds,
    E: FetchErrorBounds,
{
    /// Creates an unfetched record.
    pub fn new(key: CacheKey) -> Self {
        let (resolver, pending) = pending_result();
        let (snapshots, _) = watch::channel(Arc::new(RequestSnapshot::unfetched(pending)));
        Self {
            key,
            inner: Mutex::new(RecordInner {
                resolver: Some(resolver),
                current_cycle: None,
                next_cycle: 0,
                deferred_refresh: false,
                revalidate_interval: None,
            }),
            snapshots,
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<RequestSnapshot<T, E>> {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes whenever a new snapshot is published.
    pub fn watch(&self) -> watch::Receiver<Arc<RequestSnapshot<T, E>>> {
        self.snapshots.subscribe()
    }

    /// Handle to the current cycle's eventual outcome.
    pub fn pending(&self) -> PendingResult<T, E> {
        self.snapshots.borrow().pending()
    }

    /// Start a fetch cycle. Returns `None` without touching the record if a
    /// fetch is already in flight.
    pub fn begin_cycle(&self) -> Option<CycleToken> {
        let mut inner = self.lock();
        let current = self.snapshots.borrow().clone();
        if current.is_updating {
            return None;
        }
        Some(self.begin_locked(&mut inner, &current))
    }

    /// Coordinator check: start a cycle unless one is in flight or the cached
    /// outcome is still fresh for `interval`. Decision and state change happen
    /// under one lock.
    pub fn begin_cycle_if_due(&self, interval: Duration) -> CheckOutcome {
        let mut inner = self.lock();
        let current = self.snapshots.borrow().clone();
        if current.is_updating {
            return CheckOutcome::InFlight;
        }
        if !current.is_loading && current.is_fresh(interval) {
            return CheckOutcome::Fresh;
        }
        CheckOutcome::Started(self.begin_locked(&mut inner, &current))
    }

    fn begin_locked(
        &self,
        inner: &mut RecordInner<T, E>,
        current: &RequestSnapshot<T, E>,
    ) -> CycleToken {
        let token = CycleToken(inner.next_cycle);
        inner.next_cycle += 1;
        inner.current_cycle = Some(token);

        let mut next = current.successor();
        next.is_updating = true;
        next.is_loading = true;
        // The previous cycle's handle was already fulfilled; give this cycle its own.
        if inner.resolver.is_none() {
            let (resolver, pending) = pending_result();
            inner.resolver = Some(resolver);
            next.pending = pending;
        }
        self.publish(next);
        crate::log_fetch_start!("Cycle {:?} started for key: {}", token, self.key);
        token
    }

    /// Settle `token`'s cycle successfully. Returns false if the token is stale.
    pub fn resolve(&self, token: CycleToken, value: T) -> bool {
        self.settle(token, Ok(value))
    }

    /// Settle `token`'s cycle with a fetch failure. Returns false if the token is stale.
    pub fn reject(&self, token: CycleToken, error: E) -> bool {
        self.settle(token, Err(error))
    }

    fn settle(&self, token: CycleToken, outcome: Result<T, E>) -> bool {
        let mut inner = self.lock();
        if inner.current_cycle != Some(token) {
            crate::debug_log!(
                "⏭️ [STALE-CYCLE] Discarding outcome of {:?} for key: {}",
                token,
                self.key
            );
            return false;
        }
        inner.current_cycle = None;

        let current = self.snapshots.borrow().clone();
        let mut next = current.successor();
        next.is_loading = false;
        next.is_updating = false;
        match &outcome {
            Ok(value) => {
                next.data = Some(value.clone());
                next.error = None;
                let now = Instant::now();
                next.updated_at = Some(match current.updated_at {
                    Some(previous) if previous > now => previous,
                    _ => now,
                });
            }
            Err(error) => {
                next.data = None;
                next.error = Some(error.clone());
                next.failed_at = Some(Instant::now());
            }
        }
        crate::log_fetch_settled!(
            "Cycle {:?} for key: {} settled ({})",
            token,
            self.key,
            if outcome.is_ok() { "ok" } else { "error" }
        );
        if let Some(resolver) = inner.resolver.take() {
            resolver.fulfill(outcome);
        }
        self.publish(next);

        if std::mem::take(&mut inner.deferred_refresh) {
            crate::log_refresh!("Applying deferred refresh for key: {}", self.key);
            self.mark_due_locked(&mut inner);
        }
        true
    }

    /// Mark the record as due for a refetch.
    ///
    /// The fetch itself is left to the next coordinator check. While a fetch is
    /// in flight nothing changes now; one refetch is queued for when it settles,
    /// however many times this is called. A record that is already due keeps
    /// its current handle so simultaneous callers share one cycle.
    pub fn refresh(&self) {
        let mut inner = self.lock();
        let current = self.snapshots.borrow().clone();
        if current.is_updating {
            if !inner.deferred_refresh {
                crate::log_refresh!("Fetch in flight for key: {}, deferring refresh", self.key);
            }
            inner.deferred_refresh = true;
            return;
        }
        if current.is_loading && inner.resolver.is_some() {
            return;
        }
        self.mark_due_locked(&mut inner);
    }

    /// Freshness-poll variant of [`refresh`](Self::refresh): only acts on an
    /// idle record that is stale for its shortest observed interval.
    /// Returns true if the record was marked due.
    pub fn refresh_if_stale(&self) -> bool {
        let mut inner = self.lock();
        let current = self.snapshots.borrow().clone();
        let interval = inner.revalidate_interval.unwrap_or(Duration::ZERO);
        if current.is_updating || current.is_fresh(interval) {
            return false;
        }
        if current.is_loading && inner.resolver.is_some() {
            return false;
        }
        crate::log_refresh!("Stale entry for key: {} (interval {:?})", self.key, interval);
        self.mark_due_locked(&mut inner);
        true
    }

    fn mark_due_locked(&self, inner: &mut RecordInner<T, E>) {
        let (resolver, pending) = pending_result();
        // Replacing the resolver orphans any handle that was never fulfilled.
        inner.resolver = Some(resolver);

        let mut next = self.snapshots.borrow().successor();
        next.is_loading = true;
        next.is_updating = false;
        next.pending = pending;
        self.publish(next);
    }

    /// Record a subscriber's revalidate interval; the shortest non-zero one wins.
    ///
    /// The interval only ever shrinks: it stays in effect for the record's
    /// lifetime, even after the subscriber that asked for it detaches.
    pub fn observe_interval(&self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        let mut inner = self.lock();
        inner.revalidate_interval = Some(match inner.revalidate_interval {
            Some(existing) => existing.min(interval),
            None => interval,
        });
    }

    /// Shortest non-zero revalidate interval observed, if any.
    pub fn revalidate_interval(&self) -> Option<Duration> {
        self.lock().revalidate_interval
    }

    fn publish(&self, next: RequestSnapshot<T, E>) {
        self.snapshots.send_replace(Arc::new(next));
    }

    fn lock(&self) -> MutexGuard<'_, RecordInner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RequestStatus;

    fn record() -> RequestRecord<String, String> {
        RequestRecord::new(CacheKey::from_raw("[\"test\",null]"))
    }

    #[test]
    fn begin_cycle_is_a_try_lock() {
        let record = record();
        let token = record.begin_cycle().expect("first cycle");
        assert!(record.begin_cycle().is_none());
        assert_eq!(record.begin_cycle_if_due(Duration::ZERO), CheckOutcome::InFlight);

        let snapshot = record.snapshot();
        assert_eq!(snapshot.status(), RequestStatus::Fetching);
        assert!(record.resolve(token, "A".into()));
        assert!(record.begin_cycle().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_settles_ok_and_fulfills_handle() {
        let record = record();
        let handle = record.pending();
        let token = record.begin_cycle().unwrap();

        tokio::time::advance(Duration::from_millis(700)).await;
        let before = Instant::now();
        record.resolve(token, "A".into());

        let snapshot = record.snapshot();
        assert_eq!(snapshot.data(), Some(&"A".to_string()));
        assert_eq!(snapshot.error(), None);
        assert!(!snapshot.is_loading());
        assert!(!snapshot.is_updating());
        assert_eq!(snapshot.updated_at(), Some(before));
        assert_eq!(handle.outcome().await, Some(Ok("A".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn reject_clears_data_and_keeps_timestamp() {
        let record = record();
        let token = record.begin_cycle().unwrap();
        record.resolve(token, "A".into());
        let updated_at = record.snapshot().updated_at();

        tokio::time::advance(Duration::from_secs(1)).await;
        record.refresh();
        let handle = record.pending();
        let token = record.begin_cycle().unwrap();
        assert_eq!(record.snapshot().status(), RequestStatus::Refreshing);
        assert_eq!(record.snapshot().data(), Some(&"A".to_string()));

        record.reject(token, "boom".into());
        let snapshot = record.snapshot();
        assert_eq!(snapshot.data(), None);
        assert_eq!(snapshot.error(), Some(&"boom".to_string()));
        assert!(!snapshot.is_loading());
        assert!(!snapshot.is_updating());
        assert_eq!(snapshot.updated_at(), updated_at);
        assert_eq!(handle.outcome().await, Some(Err("boom".to_string())));
    }

    #[test]
    fn stale_tokens_are_discarded() {
        let record = record();
        let first = record.begin_cycle().unwrap();
        assert!(record.resolve(first, "A".into()));

        let second = record.begin_cycle().unwrap();
        assert!(!record.resolve(first, "late".into()));
        assert!(!record.reject(first, "late".into()));
        assert!(record.snapshot().is_updating());

        assert!(record.resolve(second, "B".into()));
        assert_eq!(record.snapshot().data(), Some(&"B".to_string()));
    }

    #[test]
    fn refresh_marks_due_without_fetching() {
        let record = record();
        let token = record.begin_cycle().unwrap();
        record.resolve(token, "A".into());
        let settled_handle = record.pending();

        record.refresh();
        let snapshot = record.snapshot();
        assert_eq!(snapshot.status(), RequestStatus::Due);
        assert!(snapshot.is_loading());
        assert!(!snapshot.is_updating());
        assert!(!snapshot.pending().same_cycle(&settled_handle));
        assert_eq!(
            record.begin_cycle_if_due(Duration::ZERO),
            CheckOutcome::Started(CycleToken(1))
        );
    }

    #[test]
    fn refresh_on_due_record_keeps_handle() {
        let record = record();
        let token = record.begin_cycle().unwrap();
        record.resolve(token, "A".into());

        record.refresh();
        let first = record.pending();
        let version = record.snapshot().version();
        record.refresh();
        assert!(record.pending().same_cycle(&first));
        assert_eq!(record.snapshot().version(), version);
    }

    #[test]
    fn refreshes_during_flight_coalesce_into_one() {
        let record = record();
        let token = record.begin_cycle().unwrap();
        let version = record.snapshot().version();
        for _ in 0..5 {
            record.refresh();
        }
        assert_eq!(record.snapshot().version(), version);

        record.resolve(token, "A".into());
        let snapshot = record.snapshot();
        assert_eq!(snapshot.status(), RequestStatus::Due);
        assert_eq!(snapshot.data(), Some(&"A".to_string()));

        let token = record.begin_cycle().unwrap();
        record.resolve(token, "B".into());
        assert_eq!(record.snapshot().status(), RequestStatus::SettledOk);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_records_skip_the_check() {
        let record = record();
        let interval = Duration::from_secs(10);
        let token = match record.begin_cycle_if_due(interval) {
            CheckOutcome::Started(token) => token,
            other => panic!("expected a new cycle, got {other:?}"),
        };
        record.resolve(token, "A".into());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(record.begin_cycle_if_due(interval), CheckOutcome::Fresh);
        assert_eq!(record.begin_cycle_if_due(Duration::ZERO), CheckOutcome::Fresh);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(matches!(
            record.begin_cycle_if_due(interval),
            CheckOutcome::Started(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_if_stale_uses_shortest_interval() {
        let record = record();
        record.observe_interval(Duration::from_secs(30));
        record.observe_interval(Duration::ZERO);
        record.observe_interval(Duration::from_secs(10));
        record.observe_interval(Duration::from_secs(30));
        assert_eq!(record.revalidate_interval(), Some(Duration::from_secs(10)));

        let token = record.begin_cycle().unwrap();
        assert!(!record.refresh_if_stale());
        record.resolve(token, "A".into());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!record.refresh_if_stale());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(record.refresh_if_stale());
        assert!(!record.refresh_if_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_wait_a_full_interval_before_going_stale() {
        let record = record();
        let interval = Duration::from_secs(10);
        record.observe_interval(interval);

        let token = record.begin_cycle().unwrap();
        record.reject(token, "boom".into());
        let failed_at = record.snapshot().failed_at();
        assert!(failed_at.is_some());
        assert!(record.snapshot().updated_at().is_none());

        assert_eq!(record.begin_cycle_if_due(interval), CheckOutcome::Fresh);
        assert!(!record.refresh_if_stale());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(record.begin_cycle_if_due(interval), CheckOutcome::Fresh);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(record.refresh_if_stale());
        assert_eq!(record.snapshot().status(), RequestStatus::Due);
        assert_eq!(record.snapshot().error(), Some(&"boom".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_goes_stale() {
        let record = record();
        let token = record.begin_cycle().unwrap();
        record.resolve(token, "A".into());

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!record.refresh_if_stale());
        assert_eq!(record.begin_cycle_if_due(Duration::ZERO), CheckOutcome::Fresh);
    }

    #[tokio::test]
    async fn watchers_see_new_versions() {
        let record = record();
        let mut rx = record.watch();
        let token = record.begin_cycle().unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_updating());

        record.resolve(token, "A".into());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().data(), Some(&"A".to_string()));
    }
}
