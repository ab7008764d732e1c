//! Error types for stateful cache operations.

use roost_cluster::ClusterError;

/// Error type for stateful cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Entry state was touched without holding the entry's lock.
    #[error("Entry must be locked")]
    EntryNotLocked,

    /// `add` found a live entry under the same key.
    #[error("An entry for the key {key} already exists")]
    AlreadyExists { key: String },

    /// `check_in` of an entry that is not checked out.
    #[error("The entry {key} is not checked-out")]
    NotCheckedOut { key: String },

    /// Checkout retries were exhausted; the entry has been purged.
    #[error("Cache is corrupted: the entry {key} could not be checked out after {attempts} attempts")]
    Corrupted { key: String, attempts: u32 },

    /// The entry under a key kept being replaced while its lock was acquired.
    #[error("The entry {key} kept changing while being locked ({attempts} attempts)")]
    Contended { key: String, attempts: u32 },

    /// Operation on a cache that has not been initialized (or was destroyed).
    #[error("Cache '{0}' is not initialized")]
    NotInitialized(String),

    /// A serialized entry names a cache id with no registered cluster.
    #[error("No cluster registered for cache id '{0}'")]
    UnknownCache(String),

    /// The cluster connection could not be established.
    #[error("Failed to initialize cache '{cache_id}': {source}")]
    Init {
        cache_id: String,
        #[source]
        source: ClusterError,
    },

    /// Entry or key (de)serialization failed.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A cluster operation failed.
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),
}

/// Result type for stateful cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
