//! State: immutable snapshots of a request record
//!
//! Every change to a record publishes a new [`RequestSnapshot`] with a higher
//! version. Observers compare versions (or `Arc` pointers) to detect change;
//! they never need to compare data.

use std::fmt;

use tokio::time::{Duration, Instant};

use crate::pending::PendingResult;

/// Common trait for async state types that represent loading, success, and error states
pub trait AsyncState {
    /// The type of successful data
    type Data;
    /// The type of error
    type Error;

    /// Returns true if no settled value is available for the current cycle
    fn is_loading(&self) -> bool;

    /// Returns true if the state contains successful data
    fn is_success(&self) -> bool;

    /// Returns true if the state contains an error
    fn is_error(&self) -> bool;

    /// Returns the data if successful, None otherwise
    fn data(&self) -> Option<&Self::Data>;

    /// Returns the error if failed, None otherwise
    fn error(&self) -> Option<&Self::Error>;
}

/// Where a record sits in its fetch state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Nothing settled yet and no fetch in flight
    Unfetched,
    /// First fetch in flight, no prior outcome
    Fetching,
    /// Fetch in flight while the previous outcome is still served
    Refreshing,
    /// Marked due for a refetch; the next coordinator check performs it
    Due,
    /// Last cycle succeeded
    SettledOk,
    /// Last cycle failed
    SettledErr,
}

/// Immutable view of a request record at one version
pub struct RequestSnapshot<T, E> {
    pub(crate) version: u64,
    pub(crate) data: Option<T>,
    pub(crate) error: Option<E>,
    pub(crate) updated_at: Option<Instant>,
    pub(crate) failed_at: Option<Instant>,
    pub(crate) is_loading: bool,
    pub(crate) is_updating: bool,
    pub(crate) pending: PendingResult<T, E>,
}

impl<T: Clone, E: Clone> RequestSnapshot<T, E> {
    pub(crate) fn unfetched(pending: PendingResult<T, E>) -> Self {
        Self {
            version: 0,
            data: None,
            error: None,
            updated_at: None,
            failed_at: None,
            is_loading: true,
            is_updating: false,
            pending,
        }
    }

    /// Copy of this snapshot with the version bumped, ready to be edited and published.
    pub(crate) fn successor(&self) -> Self {
        Self {
            version: self.version + 1,
            data: self.data.clone(),
            error: self.error.clone(),
            updated_at: self.updated_at,
            failed_at: self.failed_at,
            is_loading: self.is_loading,
            is_updating: self.is_updating,
            pending: self.pending.clone(),
        }
    }

    /// Handle to the outcome of the current cycle.
    pub fn pending(&self) -> PendingResult<T, E> {
        self.pending.clone()
    }
}

impl<T, E> RequestSnapshot<T, E> {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When the last successful fetch settled; `None` if it never has.
    pub fn updated_at(&self) -> Option<Instant> {
        self.updated_at
    }

    /// True while a fetch is in flight for this key.
    pub fn is_updating(&self) -> bool {
        self.is_updating
    }

    /// When the last failed fetch settled; `None` if none has.
    pub fn failed_at(&self) -> Option<Instant> {
        self.failed_at
    }

    /// A record is fresh if `interval` is zero or its last settled cycle,
    /// successful or not, finished less than `interval` ago. A record that
    /// never settled is never fresh.
    pub fn is_fresh(&self, interval: Duration) -> bool {
        if interval.is_zero() {
            return true;
        }
        self.updated_at
            .max(self.failed_at)
            .map(|at| at.elapsed() < interval)
            .unwrap_or(false)
    }

    pub fn status(&self) -> RequestStatus {
        let settled = self.data.is_some() || self.error.is_some();
        match (self.is_updating, self.is_loading, settled) {
            (true, _, false) => RequestStatus::Fetching,
            (true, _, true) => RequestStatus::Refreshing,
            (false, true, false) => RequestStatus::Unfetched,
            (false, true, true) => RequestStatus::Due,
            (false, false, _) if self.error.is_some() => RequestStatus::SettledErr,
            (false, false, _) => RequestStatus::SettledOk,
        }
    }
}

impl<T, E> AsyncState for RequestSnapshot<T, E> {
    type Data = T;
    type Error = E;

    fn is_loading(&self) -> bool {
        self.is_loading
    }

    fn is_success(&self) -> bool {
        self.data.is_some()
    }

    fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    fn error(&self) -> Option<&E> {
        self.error.as_ref()
    }
}

impl<T, E> RequestSnapshot<T, E> {
    /// Returns true if no settled value is available for the current cycle
    pub fn is_loading(&self) -> bool {
        <Self as AsyncState>::is_loading(self)
    }

    /// Returns the data of the last successful cycle, if it is still current
    pub fn data(&self) -> Option<&T> {
        <Self as AsyncState>::data(self)
    }

    /// Returns the error of the last failed cycle, if it is still current
    pub fn error(&self) -> Option<&E> {
        <Self as AsyncState>::error(self)
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for RequestSnapshot<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSnapshot")
            .field("version", &self.version)
            .field("data", &self.data)
            .field("error", &self.error)
            .field("updated_at", &self.updated_at)
            .field("failed_at", &self.failed_at)
            .field("is_loading", &self.is_loading)
            .field("is_updating", &self.is_updating)
            .finish_non_exhaustive()
    }
}
