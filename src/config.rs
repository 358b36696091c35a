//! Node configuration.
//!
//! Every field has a default so a node can start from an empty TOML file and
//! override only what it needs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consistency::resolver::ConflictResolutionStrategy;
use crate::error::{ClusterError, Result};
use crate::storage::partitioner::{PartitioningStrategy, ReplicationStrategy};

/// Top-level configuration for one cluster node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Nodes with a different cluster id are rejected on join.
    pub cluster_id: String,
    /// Stable node identifier, generated when empty.
    pub node_id: String,
    /// Host advertised to peers and used for the listening socket.
    pub host: String,
    /// Listening port; `0` lets the OS pick one.
    pub port: u16,
    /// `host:port` endpoints contacted on startup.
    pub seed_nodes: Vec<String>,
    pub partitioning: PartitioningStrategy,
    pub replication: ReplicationStrategy,
    /// Total copies per atom for `PrimaryBackup` (owner included).
    pub replication_factor: usize,
    pub conflict_resolution: ConflictResolutionStrategy,
    pub heartbeat: HeartbeatConfig,
    /// Peers silent for longer than this are evicted.
    #[serde(with = "humantime_serde")]
    pub stale_threshold: Duration,
    /// Cadence of the pending sync-operation flush.
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,
    pub compression: CompressionConfig,
    /// Upper bound on connect + send + response for a single exchange.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub cache: CacheConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_id: "atomspace-cluster".to_string(),
            node_id: String::new(),
            host: "127.0.0.1".to_string(),
            port: 17001,
            seed_nodes: Vec::new(),
            partitioning: PartitioningStrategy::default(),
            replication: ReplicationStrategy::default(),
            replication_factor: 2,
            conflict_resolution: ConflictResolutionStrategy::default(),
            heartbeat: HeartbeatConfig::default(),
            stale_threshold: Duration::from_secs(60),
            sync_interval: Duration::from_secs(5),
            compression: CompressionConfig::default(),
            request_timeout: Duration::from_secs(5),
            cache: CacheConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Read a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ClusterError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ClusterError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_id.is_empty() {
            return Err(ClusterError::Configuration(
                "cluster_id must not be empty".to_string(),
            ));
        }
        if self.replication_factor == 0 {
            return Err(ClusterError::Configuration(
                "replication_factor must be at least 1".to_string(),
            ));
        }
        let hb = &self.heartbeat;
        if hb.min_interval > hb.max_interval
            || hb.base_interval < hb.min_interval
            || hb.base_interval > hb.max_interval
        {
            return Err(ClusterError::Configuration(format!(
                "heartbeat intervals must satisfy min <= base <= max (got {:?} / {:?} / {:?})",
                hb.min_interval, hb.base_interval, hb.max_interval
            )));
        }
        if hb.min_interval * 2 > self.stale_threshold {
            return Err(ClusterError::Configuration(format!(
                "heartbeat min_interval {:?} must be at most half of stale_threshold {:?}",
                hb.min_interval, self.stale_threshold
            )));
        }
        Ok(())
    }

    /// Returns the configured node id, or a fresh UUID when none was set.
    pub fn resolve_node_id(&self) -> String {
        if self.node_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.node_id.clone()
        }
    }
}

/// Adaptive heartbeat tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    #[serde(with = "humantime_serde")]
    pub base_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,
    /// Consecutive quiet cycles before the interval backs off.
    pub stability_threshold: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(30),
            min_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(120),
            stability_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Atom payloads at or below this size are sent as plain JSON.
    pub threshold_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub lru_capacity: usize,
    pub partition_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub partition_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lru_capacity: 10_000,
            partition_capacity: 10_000,
            partition_ttl: Duration::from_secs(300),
        }
    }
}
