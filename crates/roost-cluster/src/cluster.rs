//! Cluster handles and bootstrap configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::map::DistributedMap;
use crate::mutex::DistributedMutex;

/// Default cluster instance name.
pub const DEFAULT_INSTANCE_NAME: &str = "roost";

/// Default interval between expiry sweeps.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(250);

/// A connection to a cluster: the source of named maps and mutexes.
pub trait Cluster: Send + Sync {
    /// Instance name this connection was bootstrapped with.
    fn name(&self) -> &str;

    /// The map called `name`. Repeated calls return the same map.
    fn map(&self, name: &str) -> Result<Arc<dyn DistributedMap>>;

    /// The mutex called `name`. Handles with the same name share one lock.
    fn lock(&self, name: &str) -> Arc<dyn DistributedMutex>;

    /// Whether the connection is still usable.
    fn is_running(&self) -> bool;

    /// Leave the cluster and release local resources.
    fn shutdown(&self);
}

/// Obtains cluster connections.
pub trait ClusterConnector: Send + Sync {
    /// Return the running cluster named by `config.instance_name`, or
    /// bootstrap a new one.
    fn connect(&self, config: &ClusterConfig) -> Result<Arc<dyn Cluster>>;
}

/// Bootstrap configuration for a cluster connection.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Instance name. Connections with the same name are shared.
    pub instance_name: String,

    /// Optional bootstrap URL understood by the backend.
    pub url: Option<String>,

    /// Backend specific properties.
    pub properties: HashMap<String, String>,

    /// How often expired entries are swept.
    pub reap_interval: Duration,

    /// Per-map capacity. Least recently written entries are evicted beyond it.
    pub max_entries: Option<usize>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            url: None,
            properties: HashMap::new(),
            reap_interval: DEFAULT_REAP_INTERVAL,
            max_entries: None,
        }
    }
}

impl ClusterConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instance name.
    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    /// Set the bootstrap URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add a backend property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set the expiry sweep interval.
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Bound every map to `max` entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }
}
