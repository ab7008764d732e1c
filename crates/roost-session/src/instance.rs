//! Cache key and payload contracts.
//!
//! The cache is generic over the caller-visible key and the stateful payload.
//! Both travel through the distributed map in serialized form, so both carry
//! serde bounds.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Requirements for a cache key.
///
/// Implemented for every type meeting the bounds.
pub trait CacheKey:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> CacheKey for T where
    T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// A stateful payload held by the cache.
pub trait StatefulInstance: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identity of the underlying instance, independent of its cache key.
    /// The entry's lock is named after it.
    fn instance_id(&self) -> &str;

    /// Idle timeout. `None` means the entry never expires on its own.
    fn timeout(&self) -> Option<Duration>;
}

/// Ready-made payload: an identified instance with user state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInstance<S> {
    /// Instance identity.
    pub id: String,

    /// Idle timeout.
    pub timeout: Option<Duration>,

    /// Application state.
    pub state: S,

    /// When the instance was created.
    pub created_at: DateTime<Utc>,
}

impl<S> SessionInstance<S> {
    /// Create an instance with a random id and no timeout.
    pub fn new(state: S) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timeout: None,
            state,
            created_at: Utc::now(),
        }
    }

    /// Use a specific instance id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<S> StatefulInstance for SessionInstance<S>
where
    S: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn instance_id(&self) -> &str {
        &self.id
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_instances_have_distinct_ids() {
        let a = SessionInstance::new(1u32);
        let b = SessionInstance::new(1u32);
        assert_ne!(a.instance_id(), b.instance_id());
        assert_eq!(a.timeout(), None);
    }

    #[test]
    fn test_builder() {
        let instance = SessionInstance::new("cart".to_string())
            .with_id("bean-7")
            .with_timeout(Duration::from_secs(1));
        assert_eq!(instance.instance_id(), "bean-7");
        assert_eq!(instance.timeout(), Some(Duration::from_secs(1)));
    }
}
