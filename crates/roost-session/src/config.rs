//! Configuration for the stateful cache.

use std::time::Duration;

use roost_cluster::ClusterConfig;
use roost_config::{
    DEFAULT_CACHE_ID, DEFAULT_MAP_NAME, DEFAULT_MAX_CHECKOUT_ATTEMPTS, RoostConfig,
};

/// Configuration for a [`StatefulCache`](crate::StatefulCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Logical cache id. Entries record it so any node can resolve their lock.
    pub cache_id: String,

    /// Name of the backing distributed map.
    pub map_name: String,

    /// Checkout attempts before an entry is purged as corrupted.
    pub max_checkout_attempts: u32,

    /// Cluster bootstrap settings.
    pub cluster: ClusterConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_id: DEFAULT_CACHE_ID.to_string(),
            map_name: DEFAULT_MAP_NAME.to_string(),
            max_checkout_attempts: DEFAULT_MAX_CHECKOUT_ATTEMPTS,
            cluster: ClusterConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the logical cache id.
    pub fn with_cache_id(mut self, cache_id: impl Into<String>) -> Self {
        self.cache_id = cache_id.into();
        self
    }

    /// Set the backing map name.
    pub fn with_map_name(mut self, map_name: impl Into<String>) -> Self {
        self.map_name = map_name.into();
        self
    }

    /// Set the checkout retry bound. Values below 1 are raised to 1.
    pub fn with_max_checkout_attempts(mut self, attempts: u32) -> Self {
        self.max_checkout_attempts = attempts.max(1);
        self
    }

    /// Set the cluster bootstrap configuration.
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }
}

impl From<&RoostConfig> for CacheConfig {
    fn from(config: &RoostConfig) -> Self {
        let cache = config.cache();
        let section = config.cluster();

        let mut cluster = ClusterConfig::new()
            .with_instance_name(section.instance_name)
            .with_reap_interval(Duration::from_millis(section.reap_interval_ms));
        cluster.url = section.url;
        cluster.max_entries = section.max_entries;
        cluster.properties = section.properties;

        Self::new()
            .with_cache_id(cache.cache_id)
            .with_map_name(cache.map_name)
            .with_max_checkout_attempts(cache.max_checkout_attempts)
            .with_cluster(cluster)
    }
}
