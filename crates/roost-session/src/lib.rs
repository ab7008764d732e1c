//! Distributed cache for stateful session instances.
//!
//! This crate stores stateful instances in a cluster map with:
//! - Per-entry cluster locks: an entry is only read or changed by the thread
//!   holding its lock
//! - An AVAILABLE / CHECKED_OUT / REMOVED lifecycle driven by check-out and
//!   check-in
//! - Idle timeouts that are re-armed on every write, with evictions reported
//!   through a [`CacheListener`]
//! - A separate namespace of instance-access locks via [`InstanceLockFactory`]
//!
//! # Example
//!
//! ```rust,ignore
//! use roost_session::{Cache, CacheConfig, ClusterRegistry, SessionInstance, StatefulCache};
//! use roost_cluster::local::LocalConnector;
//!
//! let cache: StatefulCache<String, SessionInstance<Cart>> = StatefulCache::new(
//!     CacheConfig::default(),
//!     Arc::new(LocalConnector::new()),
//!     Arc::new(ClusterRegistry::new()),
//! );
//! cache.init()?;
//!
//! cache.add("cart-1".into(), SessionInstance::new(Cart::default()))?;
//! cache.check_in(&"cart-1".into())?;
//! let cart = cache.check_out(&"cart-1".into(), true)?;
//! ```

mod cache;
mod config;
mod entry;
mod error;
mod eviction;
mod instance;
mod lock;
mod registry;

pub use cache::{Cache, CacheFilter, CacheStats, StatefulCache};
pub use config::CacheConfig;
pub use entry::{ENTRY_LOCK_PREFIX, Entry, EntryState, encode_key, entry_lock_name};
pub use error::{CacheError, Result};
pub use eviction::{CacheListener, EvictionBridge};
pub use instance::{CacheKey, SessionInstance, StatefulInstance};
pub use lock::{
    INSTANCE_LOCK_PREFIX, InstanceLock, InstanceLockFactory, StatefulLock, instance_lock_name,
};
pub use registry::ClusterRegistry;
