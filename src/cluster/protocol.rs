//! Cluster Wire Protocol
//!
//! One JSON object per line over TCP, one exchange per connection. Every
//! message carries a `type` discriminator; responses carry a `status`.
//!
//! Atom bodies travel as an `AtomPayload`: the atom's JSON, or its gzip +
//! base64 form when `compressed` is set.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::atom::Handle;
use crate::consistency::VectorClock;
use crate::membership::{ClusterNodeInfo, now_ms};

// --- Message kinds ---

pub const MSG_JOIN_REQUEST: &str = "cluster_join_request";
pub const MSG_HEARTBEAT: &str = "heartbeat";
pub const MSG_SYNC_OPERATION: &str = "sync_operation";
pub const MSG_DEPARTURE: &str = "cluster_departure";
pub const MSG_CONFLICT_RESOLUTION: &str = "conflict_resolution";
/// Write forwarded from a non-owner to the owner.
pub const MSG_STORE_ATOM: &str = "store_atom";
/// Copy pushed from the owner to a replica.
pub const MSG_REPLICATE_ATOM: &str = "replicate_atom";
pub const MSG_FETCH_ATOM: &str = "fetch_atom";
pub const MSG_REMOVE_ATOM: &str = "remove_atom";
pub const MSG_FETCH_ALL_ATOMS: &str = "fetch_all_atoms";

/// Serialized atom body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtomPayload {
    pub atom_data: String,
    #[serde(default)]
    pub compressed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationType {
    Add,
    Update,
    Remove,
}

/// A local mutation queued for propagation to peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncOperation {
    pub id: Uuid,
    pub source_node: String,
    /// `None` means every peer.
    #[serde(default)]
    pub target_node: Option<String>,
    pub operation_type: SyncOperationType,
    pub atom_handle: Handle,
    #[serde(default)]
    pub atom_data: Option<AtomPayload>,
    pub timestamp: u64,
    #[serde(default)]
    pub vector_clock: Option<VectorClock>,
}

impl SyncOperation {
    pub fn new(
        source_node: impl Into<String>,
        operation_type: SyncOperationType,
        atom_handle: Handle,
        atom_data: Option<AtomPayload>,
        vector_clock: VectorClock,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_node: source_node.into(),
            target_node: None,
            operation_type,
            atom_handle,
            atom_data,
            timestamp: now_ms(),
            vector_clock: Some(vector_clock),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterMessage {
    ClusterJoinRequest {
        cluster_id: String,
        node: ClusterNodeInfo,
    },
    Heartbeat {
        node: ClusterNodeInfo,
    },
    SyncOperation {
        operation: SyncOperation,
    },
    ClusterDeparture {
        node_id: String,
    },
    ConflictResolution {
        source_node: String,
        atom_handle: Handle,
        atom_data: AtomPayload,
        vector_clock: VectorClock,
    },
    StoreAtom {
        op_id: String,
        source_node: String,
        atom_data: AtomPayload,
    },
    ReplicateAtom {
        op_id: String,
        source_node: String,
        atom_data: AtomPayload,
    },
    FetchAtom {
        atom_handle: Handle,
    },
    RemoveAtom {
        atom_handle: Handle,
        source_node: String,
        /// Set when the receiver should fan the removal out to replicas.
        #[serde(default)]
        propagate: bool,
    },
    FetchAllAtoms {
        source_node: String,
    },
}

impl ClusterMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClusterJoinRequest { .. } => MSG_JOIN_REQUEST,
            Self::Heartbeat { .. } => MSG_HEARTBEAT,
            Self::SyncOperation { .. } => MSG_SYNC_OPERATION,
            Self::ClusterDeparture { .. } => MSG_DEPARTURE,
            Self::ConflictResolution { .. } => MSG_CONFLICT_RESOLUTION,
            Self::StoreAtom { .. } => MSG_STORE_ATOM,
            Self::ReplicateAtom { .. } => MSG_REPLICATE_ATOM,
            Self::FetchAtom { .. } => MSG_FETCH_ATOM,
            Self::RemoveAtom { .. } => MSG_REMOVE_ATOM,
            Self::FetchAllAtoms { .. } => MSG_FETCH_ALL_ATOMS,
        }
    }

    /// Broadcast messages are fire-and-forget; everything else gets one response line.
    pub fn expects_response(&self) -> bool {
        !matches!(
            self,
            Self::Heartbeat { .. }
                | Self::SyncOperation { .. }
                | Self::ClusterDeparture { .. }
                | Self::ConflictResolution { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClusterResponse {
    Accepted {
        cluster_id: String,
        nodes: Vec<ClusterNodeInfo>,
    },
    Rejected {
        reason: String,
    },
    Found {
        atom_data: AtomPayload,
    },
    NotFound,
    Success,
    Failed {
        reason: String,
    },
    Atoms {
        atoms: Vec<AtomPayload>,
    },
}

impl ClusterResponse {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Found { .. } => "found",
            Self::NotFound => "not_found",
            Self::Success => "success",
            Self::Failed { .. } => "failed",
            Self::Atoms { .. } => "atoms",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
