//! # Reference-counted lifecycles
//!
//! [`RefCountedLifecycle`] runs a shared background activity once per key for
//! as long as at least one holder exists. The activity starts on the first
//! activation and is torn down only after the last holder has been gone for a
//! full grace period, so rapid detach/attach churn from independent consumers
//! reuses the running activity instead of restarting it.
//!
//! ```rust,no_run
//! use request_store::lifecycle::RefCountedLifecycle;
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let lifecycle = RefCountedLifecycle::new(Duration::from_secs(1));
//! let lease = lifecycle.activate("ticker:BTCUSDT", |key| {
//!     println!("starting poll for {key}");
//!     Some(Box::new(|| println!("stopping poll")) as request_store::lifecycle::Teardown)
//! });
//! drop(lease); // teardown runs one second later unless someone re-activates
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{runtime::Handle, task::JoinHandle};

/// Action that stops a shared activity
pub type Teardown = Box<dyn FnOnce() + Send + 'static>;

struct PendingTeardown {
    epoch: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct LifecycleEntry {
    count: usize,
    /// True between the effect running and its teardown running.
    active: bool,
    teardown: Option<Teardown>,
    pending_teardown: Option<PendingTeardown>,
    epoch: u64,
}

struct LifecycleInner {
    grace: Duration,
    entries: Mutex<HashMap<String, LifecycleEntry>>,
}

/// Shared-resource activation manager keyed by string
#[derive(Clone)]
pub struct RefCountedLifecycle {
    inner: Arc<LifecycleInner>,
}

impl RefCountedLifecycle {
    /// Creates a lifecycle whose teardowns wait `grace` after the last release.
    pub fn new(grace: Duration) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                grace,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn grace(&self) -> Duration {
        self.inner.grace
    }

    /// Register one holder of `key`.
    ///
    /// On the first holder, `effect` runs and its teardown (if any) is kept.
    /// A holder arriving during the grace period cancels the pending teardown
    /// and shares the still-running activity; `effect` does not run again.
    ///
    /// `effect` runs while the lifecycle's table is locked and must not call
    /// back into the same lifecycle.
    pub fn activate<F>(&self, key: &str, effect: F) -> LifecycleLease
    where
        F: FnOnce(&str) -> Option<Teardown>,
    {
        let mut entries = self.inner.lock();
        let entry = entries.entry(key.to_owned()).or_default();

        if let Some(pending) = entry.pending_teardown.take() {
            pending.timer.abort();
            crate::log_lifecycle!("Reactivated during grace period, keeping resource for: {}", key);
        }

        entry.count += 1;
        if entry.count == 1 && !entry.active {
            entry.active = true;
            entry.teardown = effect(key);
            crate::log_lifecycle!("Started shared resource for: {}", key);
        }

        LifecycleLease {
            lifecycle: self.clone(),
            key: key.to_owned(),
            released: false,
        }
    }

    /// Release one holder of `key`.
    ///
    /// When the count reaches zero the teardown is scheduled after the grace
    /// period. Releasing a key that has no holders is ignored.
    pub fn deactivate(&self, key: &str) {
        let mut entries = self.inner.lock();
        let Some(entry) = entries.get_mut(key) else {
            crate::warn_log!("Deactivate for unknown lifecycle key: {}", key);
            return;
        };
        if entry.count == 0 {
            crate::warn_log!("Unbalanced deactivate for lifecycle key: {}", key);
            return;
        }

        entry.count -= 1;
        if entry.count > 0 || entry.pending_teardown.is_some() {
            return;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) if !self.inner.grace.is_zero() => runtime,
            _ => {
                let teardown = entry.take_resource();
                drop(entries);
                run_teardown(key, teardown);
                return;
            }
        };

        entry.epoch += 1;
        let epoch = entry.epoch;
        let grace = self.inner.grace;
        let weak: Weak<LifecycleInner> = Arc::downgrade(&self.inner);
        let owned_key = key.to_owned();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&owned_key, epoch);
            }
        });
        entry.pending_teardown = Some(PendingTeardown { epoch, timer });
    }

    /// Current number of holders of `key`.
    pub fn count(&self, key: &str) -> usize {
        self.inner.lock().get(key).map(|entry| entry.count).unwrap_or(0)
    }

    /// True while `key`'s activity is running (including during its grace period).
    pub fn is_active(&self, key: &str) -> bool {
        self.inner
            .lock()
            .get(key)
            .map(|entry| entry.active)
            .unwrap_or(false)
    }
}

impl LifecycleEntry {
    fn take_resource(&mut self) -> Option<Teardown> {
        self.active = false;
        self.teardown.take()
    }
}

impl LifecycleInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, LifecycleEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expire(&self, key: &str, epoch: u64) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        match &entry.pending_teardown {
            Some(pending) if pending.epoch == epoch => {}
            _ => return,
        }
        entry.pending_teardown = None;
        if entry.count != 0 {
            return;
        }
        let teardown = entry.take_resource();
        drop(entries);
        run_teardown(key, teardown);
    }
}

impl Drop for LifecycleInner {
    fn drop(&mut self) {
        let entries = std::mem::take(
            self.entries
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (key, mut entry) in entries {
            if let Some(pending) = entry.pending_teardown.take() {
                pending.timer.abort();
            }
            if entry.active {
                run_teardown(&key, entry.take_resource());
            }
        }
    }
}

fn run_teardown(key: &str, teardown: Option<Teardown>) {
    if let Some(teardown) = teardown {
        teardown();
    }
    crate::log_lifecycle!("Tore down shared resource for: {}", key);
}

impl fmt::Debug for RefCountedLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCountedLifecycle")
            .field("grace", &self.inner.grace)
            .finish_non_exhaustive()
    }
}

/// One holder's claim on a lifecycle key; releases it on drop
pub struct LifecycleLease {
    lifecycle: RefCountedLifecycle,
    key: String,
    released: bool,
}

impl LifecycleLease {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the claim now instead of at drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !std::mem::replace(&mut self.released, true) {
            self.lifecycle.deactivate(&self.key);
        }
    }
}

impl Drop for LifecycleLease {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for LifecycleLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleLease")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish()
    }
}
