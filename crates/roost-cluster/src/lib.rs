//! Cluster capabilities used by the Roost stateful cache.
//!
//! This crate defines the two collaborators the cache is built on:
//! - [`DistributedMap`]: a byte-keyed map with per-entry TTL and entry
//!   lifecycle listeners
//! - [`DistributedMutex`]: a re-entrant, thread-owned lock identified by name
//!
//! Both are obtained from a [`Cluster`], which a [`ClusterConnector`]
//! bootstraps from a [`ClusterConfig`]. The [`local`] module provides an
//! in-process implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use roost_cluster::{ClusterConfig, ClusterConnector, local::LocalConnector};
//!
//! let connector = LocalConnector::new();
//! let cluster = connector.connect(&ClusterConfig::default())?;
//! let sessions = cluster.map("sessions")?;
//! let lock = cluster.lock("session-42");
//! ```

mod cluster;
mod error;
pub mod local;
mod map;
mod mutex;

pub use cluster::{
    Cluster, ClusterConfig, ClusterConnector, DEFAULT_INSTANCE_NAME, DEFAULT_REAP_INTERVAL,
};
pub use error::{ClusterError, Result};
pub use map::{DistributedMap, EntryEvent, EntryEventKind, EntryListener, ListenerId, dispatch};
pub use mutex::{
    DistributedMutex, MutexGuard, MutexHandle, OwnedMutexGuard, lock_owned, lock_scoped,
};
