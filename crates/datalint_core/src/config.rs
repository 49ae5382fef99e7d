//! Configuration for the result cache.

use crate::{DatalintError, FingerprintAlgorithm};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum number of cache entries.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Largest accepted cache capacity.
pub const MAX_CAPACITY: usize = 1 << 24;

/// How the cache chooses entries to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Drop the least recently used entry when full
    #[default]
    Lru,
    /// Entries expire after a fixed age; the oldest goes first when full
    Ttl {
        /// Entry lifetime in milliseconds
        ttl_ms: u64,
    },
}

impl EvictionPolicy {
    /// Entry lifetime, for time-based policies.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            EvictionPolicy::Lru => None,
            EvictionPolicy::Ttl { ttl_ms } => Some(Duration::from_millis(*ttl_ms)),
        }
    }
}

/// Configuration for a result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub capacity: usize,

    /// Eviction policy
    pub eviction_policy: EvictionPolicy,

    /// Hash used for content fingerprints
    pub fingerprint_algorithm: FingerprintAlgorithm,

    /// Snapshot file loaded at creation and written by `persist`
    pub persist_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            eviction_policy: EvictionPolicy::Lru,
            fingerprint_algorithm: FingerprintAlgorithm::Xxh3,
            persist_path: None,
        }
    }
}

impl CacheConfig {
    /// Creates a new builder for `CacheConfig`.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), DatalintError> {
        if self.capacity == 0 {
            return Err(DatalintError::cache_config(
                "capacity must be at least 1".to_string(),
            ));
        }

        if self.capacity > MAX_CAPACITY {
            return Err(DatalintError::cache_config(format!(
                "capacity {} exceeds the maximum of {}",
                self.capacity, MAX_CAPACITY
            )));
        }

        if let EvictionPolicy::Ttl { ttl_ms: 0 } = self.eviction_policy {
            return Err(DatalintError::cache_config(
                "ttl_ms must be greater than zero".to_string(),
            ));
        }

        if let Some(path) = &self.persist_path {
            if path.as_os_str().is_empty() {
                return Err(DatalintError::cache_config(
                    "persist_path cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for `CacheConfig`.
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    capacity: Option<usize>,
    eviction_policy: Option<EvictionPolicy>,
    fingerprint_algorithm: Option<FingerprintAlgorithm>,
    persist_path: Option<PathBuf>,
}

impl CacheConfigBuilder {
    /// Sets the maximum number of entries.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Uses least-recently-used eviction.
    pub fn lru(mut self) -> Self {
        self.eviction_policy = Some(EvictionPolicy::Lru);
        self
    }

    /// Uses time-to-live eviction.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.eviction_policy = Some(EvictionPolicy::Ttl {
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        });
        self
    }

    /// Sets the eviction policy directly.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Sets the fingerprint hash.
    pub fn fingerprint_algorithm(mut self, algorithm: FingerprintAlgorithm) -> Self {
        self.fingerprint_algorithm = Some(algorithm);
        self
    }

    /// Sets the snapshot file.
    pub fn persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// Builds the `CacheConfig`.
    ///
    /// Unset options take their defaults; invalid values are rejected.
    pub fn build(self) -> Result<CacheConfig, DatalintError> {
        let defaults = CacheConfig::default();
        let config = CacheConfig {
            capacity: self.capacity.unwrap_or(defaults.capacity),
            eviction_policy: self.eviction_policy.unwrap_or(defaults.eviction_policy),
            fingerprint_algorithm: self
                .fingerprint_algorithm
                .unwrap_or(defaults.fingerprint_algorithm),
            persist_path: self.persist_path,
        };

        config.validate()?;
        Ok(config)
    }
}
