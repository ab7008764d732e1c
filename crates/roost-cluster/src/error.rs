//! Error types for cluster operations.

/// Errors surfaced by a cluster backend.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The cluster (or the map/mutex it owns) has been shut down.
    #[error("cluster '{0}' is shut down")]
    ShutDown(String),

    /// Unlock was attempted by a thread that does not hold the mutex.
    #[error("current thread does not own lock '{name}'")]
    NotLockOwner { name: String },

    /// The cluster could not be bootstrapped.
    #[error("failed to bootstrap cluster: {0}")]
    Bootstrap(String),

    /// A map operation failed inside the backend.
    #[error("map error: {0}")]
    Map(String),
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
