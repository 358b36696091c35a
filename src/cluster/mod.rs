//! Cluster Coordination Module
//!
//! Turns a local `AtomSpace` into one member of a cluster.
//!
//! ## Responsibilities
//! - **Lifecycle**: `start` / `join_cluster` / `stop`, with a TCP server loop,
//!   an adaptive heartbeat loop and a periodic sync loop.
//! - **Replication of changes**: local mutations are queued as `SyncOperation`s
//!   carrying a vector clock and broadcast to every peer.
//! - **Consistency**: inbound operations are checked against causal history;
//!   concurrent edits go through the configured `ConflictResolver`.
//! - **Extension**: higher layers register handlers for their own message kinds
//!   and subscribe to `ClusterEvent`s.

pub mod events;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod transport;

pub use events::{ClusterEvent, EventBus};
pub use protocol::{AtomPayload, ClusterMessage, ClusterResponse, SyncOperation, SyncOperationType};
pub use registry::MessageHandlerRegistry;
pub use service::DistributedCluster;
pub use transport::ClusterTransport;
