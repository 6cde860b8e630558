//! Subscriber handles and change listeners.

use std::{fmt, sync::Arc};

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    key::CacheKey,
    lifecycle::LifecycleLease,
    pending::PendingResult,
    record::RequestRecord,
    state::RequestSnapshot,
    types::{FetchErrorBounds, FetchOutputBounds},
};

/// One subscriber's attachment to a request record.
///
/// Holding a `Subscription` keeps the key's freshness poll alive and re-runs
/// the coordinator check whenever the record changes. Dropping it stops the
/// checks and releases the poll (after the store's teardown grace). An
/// in-flight fetch is not cancelled; its outcome still lands in the record.
pub struct Subscription<T, E> {
    record: Arc<RequestRecord<T, E>>,
    changes: watch::Receiver<Arc<RequestSnapshot<T, E>>>,
    driver: JoinHandle<()>,
    _lease: LifecycleLease,
}

impl<T, E> Subscription<T, E>
where
    T: FetchOutputBounds,
    E: FetchErrorBounds,
{
    pub(crate) fn new(
        record: Arc<RequestRecord<T, E>>,
        driver: JoinHandle<()>,
        lease: LifecycleLease,
    ) -> Self {
        let changes = record.watch();
        Self {
            record,
            changes,
            driver,
            _lease: lease,
        }
    }

    pub fn key(&self) -> &CacheKey {
        self.record.key()
    }

    /// The record's current snapshot.
    pub fn snapshot(&self) -> Arc<RequestSnapshot<T, E>> {
        self.record.snapshot()
    }

    /// Mark the record due; every attached subscriber's check picks it up and
    /// exactly one fetch starts.
    pub fn refresh(&self) {
        self.record.refresh();
    }

    /// Handle to the current cycle's outcome.
    pub fn pending(&self) -> PendingResult<T, E> {
        self.record.pending()
    }

    /// Wait until the record publishes a snapshot this subscription has not
    /// seen yet, and return it.
    pub async fn changed(&mut self) -> Arc<RequestSnapshot<T, E>> {
        // The record owns the sender and outlives this subscription.
        let _ = self.changes.changed().await;
        self.changes.borrow_and_update().clone()
    }

    /// Call `listener` after the record changes. See [`RequestRecord::subscribe`].
    pub fn on_change<L>(&self, listener: L) -> ListenerGuard
    where
        L: Fn(&RequestSnapshot<T, E>) + Send + 'static,
    {
        self.record.subscribe(listener)
    }

    pub fn record(&self) -> &Arc<RequestRecord<T, E>> {
        &self.record
    }
}

impl<T, E> Drop for Subscription<T, E> {
    fn drop(&mut self) {
        self.driver.abort();
        crate::debug_log!("🔌 [SUBSCRIBE] Subscriber detached from key: {}", self.record.key());
    }
}

impl<T, E> fmt::Debug for Subscription<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", self.record.key())
            .finish_non_exhaustive()
    }
}

impl<T, E> RequestRecord<T, E>
where
    T: FetchOutputBounds,
    E: FetchErrorBounds,
{
    /// Register a change listener.
    ///
    /// The listener runs on a spawned task after each publish. Bursts of
    /// publishes may be collapsed into a single call with the latest snapshot.
    /// Dropping or [unsubscribing](ListenerGuard::unsubscribe) the guard stops
    /// further calls.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<L>(&self, listener: L) -> ListenerGuard
    where
        L: Fn(&RequestSnapshot<T, E>) + Send + 'static,
    {
        let mut changes = self.watch();
        let task = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let snapshot = changes.borrow_and_update().clone();
                listener(&snapshot);
            }
        });
        ListenerGuard { task }
    }
}

/// Keeps a change listener registered; unregisters it on drop
#[must_use = "dropping the guard unregisters the listener"]
pub struct ListenerGuard {
    task: JoinHandle<()>,
}

impl ListenerGuard {
    pub fn unsubscribe(self) {}
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn listeners_see_changes_until_unsubscribed() {
        let record = RequestRecord::<u32, String>::new(CacheKey::from_raw("[\"l\",null]"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let guard = record.subscribe(move |snapshot: &RequestSnapshot<u32, String>| {
            sink.lock().unwrap().push(snapshot.data().copied());
        });

        let token = record.begin_cycle().unwrap();
        sleep(Duration::from_millis(1)).await;
        record.resolve(token, 7);
        sleep(Duration::from_millis(1)).await;

        guard.unsubscribe();
        record.refresh();
        sleep(Duration::from_millis(1)).await;

        assert_eq!(*seen.lock().unwrap(), vec![None, Some(7)]);
    }
}
