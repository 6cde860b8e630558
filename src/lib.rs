#![doc = include_str!("../README.md")]

// Core modules
pub mod errors;
pub mod fetcher;
pub mod key;
pub mod lifecycle;
mod log_utils;
pub mod memo;
pub mod param_utils;
pub mod pending;
pub mod record;
pub mod registry;
pub mod state;
pub mod store;
pub mod subscription;
pub mod types;

// Re-export commonly used items at crate root for convenience
pub use store::{RequestStore, StoreConfig};

pub mod prelude {
    //! The prelude exports all the most common types and functions for using request-store.

    // The fetcher trait and the macro
    pub use crate::fetcher::Fetcher;
    pub use request_store_macros::fetcher;

    // The store and its subscriber handles
    pub use crate::store::{RequestStore, StoreConfig};
    pub use crate::subscription::{ListenerGuard, Subscription};

    // Snapshot types, needed for reading and matching
    pub use crate::pending::PendingResult;
    pub use crate::state::{AsyncState, RequestSnapshot, RequestStatus};

    // Keys and errors
    pub use crate::errors::{StoreError, StoreResult};
    pub use crate::key::CacheKey;

    // Standalone building blocks
    pub use crate::lifecycle::{LifecycleLease, RefCountedLifecycle};
    pub use crate::memo::KeyMemo;
    pub use crate::registry::KeyedRegistry;

    // Argument utilities for custom types
    pub use crate::param_utils::IntoFetchArgs;
}
