//! Membership & Failure Detection Module
//!
//! Tracks which nodes belong to the cluster and how recently each one was heard from.
//!
//! ## Core Mechanisms
//! - **Heartbeats**: every node periodically broadcasts its own `ClusterNodeInfo`; receivers
//!   record it with their local observation time.
//! - **Staleness**: a peer silent for longer than the configured threshold is evicted during the
//!   next heartbeat cycle, whatever status it last reported.
//! - **Adaptive interval**: `AdaptiveHeartbeatController` speeds heartbeats up under churn and
//!   backs off while the cluster is calm.

pub mod heartbeat;
pub mod service;
pub mod types;

pub use heartbeat::{AdaptiveHeartbeatController, HeartbeatStats};
pub use service::ClusterMembership;
pub use types::{ClusterNodeInfo, NodeStatus, now_ms};
