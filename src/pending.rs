//! Pending-result handles shared by everyone waiting on a fetch cycle.

use std::fmt;

use futures::future::{FutureExt, Shared};
use tokio::sync::oneshot;

/// Handle to the eventual outcome of one fetch cycle.
///
/// Cloning is cheap and every clone observes the same outcome. A handle whose
/// cycle was superseded before it settled is orphaned: it is never fulfilled and
/// [`PendingResult::outcome`] yields `None` for it.
pub struct PendingResult<T, E> {
    inner: Shared<oneshot::Receiver<Result<T, E>>>,
}

/// Write side of a [`PendingResult`], owned by the record.
pub(crate) struct Resolver<T, E> {
    tx: oneshot::Sender<Result<T, E>>,
}

/// Allocate a fresh handle and its resolver.
pub(crate) fn pending_result<T, E>() -> (Resolver<T, E>, PendingResult<T, E>)
where
    T: Clone,
    E: Clone,
{
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, PendingResult { inner: rx.shared() })
}

impl<T, E> Resolver<T, E> {
    pub(crate) fn fulfill(self, outcome: Result<T, E>) {
        // Nobody holding a handle is fine: the outcome also lands in the record.
        let _ = self.tx.send(outcome);
    }
}

impl<T: Clone, E: Clone> PendingResult<T, E> {
    /// Wait for the cycle to settle.
    ///
    /// Returns `None` if the cycle was superseded before settling.
    pub async fn outcome(self) -> Option<Result<T, E>> {
        self.inner.await.ok()
    }

    /// The outcome, if the cycle has settled and a waiter has already observed it.
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.inner.peek().and_then(|settled| settled.clone().ok())
    }

    /// True if this handle and `other` refer to the same cycle.
    pub fn same_cycle(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<T, E> Clone for PendingResult<T, E>
where
    T: Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> fmt::Debug for PendingResult<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResult").finish_non_exhaustive()
    }
}
