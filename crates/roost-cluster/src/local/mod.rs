//! Single-process cluster backend.
//!
//! Implements the cluster contracts entirely in memory. Useful for a single
//! node deployment and as the backend for tests.

mod cluster;
mod map;
mod mutex;

pub use cluster::{LOCAL_URL_SCHEME, LocalCluster, LocalConnector};
pub use map::LocalMap;
pub use mutex::LocalMutex;
