use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Lifecycle of a cluster node.
///
/// The local node moves `Initializing -> Active` on start. A peer's status is
/// whatever it last reported in a heartbeat; staleness is judged separately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Initializing,
    Active,
    Synchronizing,
    Degraded,
    Offline,
    Failed,
}

/// Represents a single member in the cluster.
///
/// `last_heartbeat` is milliseconds since the UNIX epoch and only informs
/// humans. Staleness is judged on `last_seen`, a monotonic stamp taken by the
/// observing node when a heartbeat arrives; it never crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterNodeInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub status: NodeStatus,
    pub last_heartbeat: u64,
    pub atomspace_size: u64,
    pub load_factor: f64,
    #[serde(default)]
    pub data_partitions: Vec<String>,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

impl ClusterNodeInfo {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            status: NodeStatus::Initializing,
            last_heartbeat: now_ms(),
            atomspace_size: 0,
            load_factor: 0.0,
            data_partitions: Vec::new(),
            last_seen: None,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.is_stale_at(threshold, Instant::now())
    }

    /// A node never observed locally (`last_seen == None`) is not stale.
    pub fn is_stale_at(&self, threshold: Duration, now: Instant) -> bool {
        self.last_seen
            .is_some_and(|seen| now.saturating_duration_since(seen) > threshold)
    }

    pub fn silence_at(&self, now: Instant) -> Duration {
        self.last_seen
            .map(|seen| now.saturating_duration_since(seen))
            .unwrap_or_default()
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
