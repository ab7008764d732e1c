//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [cache]                  # logical cache identity and checkout policy
//! [cluster]                # cluster bootstrap settings
//! [cluster.properties]     # backend specific key/value pairs
//! [logging]                # log directory and level
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default logical cache id.
pub const DEFAULT_CACHE_ID: &str = "roost-stateful-cache";

/// Default name of the backing distributed map.
pub const DEFAULT_MAP_NAME: &str = "roost-stateful-cache";

/// Default number of checkout attempts before an entry is declared corrupted.
pub const DEFAULT_MAX_CHECKOUT_ATTEMPTS: u32 = 10;

/// Default cluster instance name.
pub const DEFAULT_INSTANCE_NAME: &str = "roost";

/// Default expiry sweep interval in milliseconds.
pub const DEFAULT_REAP_INTERVAL_MS: u64 = 250;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoostConfig {
    /// Logical cache settings.
    pub cache: Option<CacheSection>,

    /// Cluster bootstrap settings.
    pub cluster: Option<ClusterSection>,

    /// Logging settings.
    pub logging: Option<LoggingSection>,
}

impl RoostConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: RoostConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: RoostConfig) {
        if other.cache.is_some() {
            self.cache = other.cache;
        }

        if other.cluster.is_some() {
            self.cluster = other.cluster;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// The `[cache]` section, or defaults.
    pub fn cache(&self) -> CacheSection {
        self.cache.clone().unwrap_or_default()
    }

    /// The `[cluster]` section, or defaults.
    pub fn cluster(&self) -> ClusterSection {
        self.cluster.clone().unwrap_or_default()
    }

    /// The `[logging]` section, or defaults.
    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }

    /// Reject values that would make the cache unusable.
    pub fn validate(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            if cache.cache_id.trim().is_empty() {
                return Err(invalid("cache.cache_id", "must not be empty"));
            }
            if cache.map_name.trim().is_empty() {
                return Err(invalid("cache.map_name", "must not be empty"));
            }
            if cache.max_checkout_attempts == 0 {
                return Err(invalid("cache.max_checkout_attempts", "must be at least 1"));
            }
        }

        if let Some(cluster) = &self.cluster {
            if cluster.instance_name.trim().is_empty() {
                return Err(invalid("cluster.instance_name", "must not be empty"));
            }
            if cluster.reap_interval_ms == 0 {
                return Err(invalid("cluster.reap_interval_ms", "must be greater than 0"));
            }
            if cluster.max_entries == Some(0) {
                return Err(invalid("cluster.max_entries", "must be greater than 0"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// The `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Logical cache id. Distinguishes several caches sharing one process.
    pub cache_id: String,

    /// Name of the backing distributed map.
    pub map_name: String,

    /// Checkout attempts before an entry is purged as corrupted.
    pub max_checkout_attempts: u32,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            cache_id: DEFAULT_CACHE_ID.to_string(),
            map_name: DEFAULT_MAP_NAME.to_string(),
            max_checkout_attempts: DEFAULT_MAX_CHECKOUT_ATTEMPTS,
        }
    }
}

/// The `[cluster]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Cluster instance name; caches naming the same instance share it.
    pub instance_name: String,

    /// Bootstrap URL for the cluster backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Expiry sweep interval in milliseconds.
    pub reap_interval_ms: u64,

    /// Per-map capacity bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,

    /// Backend specific properties.
    pub properties: HashMap<String, String>,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            url: None,
            reap_interval_ms: DEFAULT_REAP_INTERVAL_MS,
            max_entries: None,
            properties: HashMap::new(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Directory for rolling JSON log files. Defaults to `<config dir>/logs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Console filter directive (e.g. `info`, `roost_session=debug`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RoostConfig::from_toml("").unwrap();
        assert_eq!(config, RoostConfig::default());
        assert_eq!(config.cache().cache_id, DEFAULT_CACHE_ID);
        assert_eq!(config.cache().max_checkout_attempts, 10);
        assert_eq!(config.cluster().reap_interval_ms, DEFAULT_REAP_INTERVAL_MS);
    }

    #[test]
    fn test_parse_full_config() {
        let config = RoostConfig::from_toml(
            r#"
[cache]
cache_id = "billing"
map_name = "billing-sessions"
max_checkout_attempts = 3

[cluster]
instance_name = "billing-node"
url = "local://billing"
reap_interval_ms = 50
max_entries = 500

[cluster.properties]
backup-count = "1"

[logging]
directory = "/var/log/roost"
level = "debug"
"#,
        )
        .unwrap();

        let cache = config.cache();
        assert_eq!(cache.cache_id, "billing");
        assert_eq!(cache.map_name, "billing-sessions");
        assert_eq!(cache.max_checkout_attempts, 3);

        let cluster = config.cluster();
        assert_eq!(cluster.instance_name, "billing-node");
        assert_eq!(cluster.url.as_deref(), Some("local://billing"));
        assert_eq!(cluster.max_entries, Some(500));
        assert_eq!(cluster.properties.get("backup-count").unwrap(), "1");

        assert_eq!(config.logging().level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config = RoostConfig::from_toml("[cache]\ncache_id = \"orders\"\n").unwrap();
        let cache = config.cache();
        assert_eq!(cache.cache_id, "orders");
        assert_eq!(cache.map_name, DEFAULT_MAP_NAME);
    }

    #[test]
    fn test_merge_overrides_sections() {
        let mut base = RoostConfig::from_toml("[cache]\ncache_id = \"base\"\n").unwrap();
        let overlay =
            RoostConfig::from_toml("[cluster]\ninstance_name = \"overlay\"\n").unwrap();
        base.merge(overlay);

        assert_eq!(base.cache().cache_id, "base");
        assert_eq!(base.cluster().instance_name, "overlay");
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = RoostConfig::from_toml("[cache]\nmax_checkout_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "cache.max_checkout_attempts"));
    }

    #[test]
    fn test_rejects_zero_reap_interval() {
        let err = RoostConfig::from_toml("[cluster]\nreap_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_toml_roundtrip_preserves_values() {
        let mut config = RoostConfig::new();
        config.cache = Some(CacheSection {
            cache_id: "inventory".to_string(),
            ..Default::default()
        });
        let text = config.to_toml().unwrap();
        assert_eq!(RoostConfig::from_toml(&text).unwrap(), config);
    }
}
