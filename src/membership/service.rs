use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::types::{ClusterNodeInfo, NodeStatus, now_ms};

/// Membership table for one node, including the node itself.
pub struct ClusterMembership {
    local_id: String,
    members: DashMap<String, ClusterNodeInfo>,
}

impl ClusterMembership {
    pub fn new(local_node: ClusterNodeInfo) -> Self {
        let members = DashMap::new();
        let local_id = local_node.id.clone();
        members.insert(local_id.clone(), local_node);
        Self { local_id, members }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn is_local(&self, node_id: &str) -> bool {
        self.local_id == node_id
    }

    pub fn local_node(&self) -> ClusterNodeInfo {
        self.members
            .get(&self.local_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| ClusterNodeInfo::new(self.local_id.clone(), "127.0.0.1", 0))
    }

    /// Applies `update` to the local entry and refreshes its heartbeat stamp.
    pub fn update_local<F>(&self, update: F)
    where
        F: FnOnce(&mut ClusterNodeInfo),
    {
        if let Some(mut local) = self.members.get_mut(&self.local_id) {
            update(local.value_mut());
            local.last_heartbeat = now_ms();
        }
    }

    pub fn set_local_status(&self, status: NodeStatus) {
        self.update_local(|local| {
            if local.status != status {
                tracing::info!("Local node {} status {:?} -> {:?}", local.id, local.status, status);
            }
            local.status = status;
        });
    }

    pub fn get_member(&self, node_id: &str) -> Option<ClusterNodeInfo> {
        self.members.get(node_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.members.contains_key(node_id)
    }

    /// Records a heartbeat (or join) from a peer, stamping it with the local
    /// observation time. Returns `true` if the peer was not known before.
    pub fn record_heartbeat(&self, mut node: ClusterNodeInfo) -> bool {
        if node.id == self.local_id {
            return false;
        }
        node.last_heartbeat = now_ms();
        node.last_seen = Some(Instant::now());
        match self.members.get_mut(&node.id) {
            Some(mut existing) => {
                if existing.status != node.status {
                    tracing::debug!(
                        "Node {} reports {:?} (was {:?})",
                        node.id,
                        node.status,
                        existing.status
                    );
                }
                *existing = node;
                false
            }
            None => {
                tracing::info!("Discovered new member: {} at {}", node.id, node.addr());
                self.members.insert(node.id.clone(), node);
                true
            }
        }
    }

    /// Inserts a peer entry as-is, keeping its `last_seen` stamp (or taking
    /// one now if it has none).
    pub fn insert(&self, mut node: ClusterNodeInfo) {
        node.last_seen.get_or_insert_with(Instant::now);
        self.members.insert(node.id.clone(), node);
    }

    pub fn remove(&self, node_id: &str) -> Option<ClusterNodeInfo> {
        if node_id == self.local_id {
            return None;
        }
        self.members.remove(node_id).map(|(_, node)| node)
    }

    /// Every member except the local node.
    pub fn peers(&self) -> Vec<ClusterNodeInfo> {
        self.members
            .iter()
            .filter(|entry| entry.key() != &self.local_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn members(&self) -> Vec<ClusterNodeInfo> {
        self.members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Member ids in sorted order, so every node sees the same sequence.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.members.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn prune_stale(&self, threshold: Duration) -> Vec<ClusterNodeInfo> {
        self.prune_stale_at(threshold, Instant::now())
    }

    /// Removes peers whose last heartbeat is older than `threshold` and
    /// returns them. The local node is never pruned.
    pub fn prune_stale_at(&self, threshold: Duration, now: Instant) -> Vec<ClusterNodeInfo> {
        let stale: Vec<String> = self
            .members
            .iter()
            .filter(|entry| {
                entry.key() != &self.local_id && entry.value().is_stale_at(threshold, now)
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = Vec::new();
        for node_id in stale {
            // Re-check under the entry lock: a heartbeat may have landed meanwhile.
            if let Some((_, node)) = self
                .members
                .remove_if(&node_id, |_, node| node.is_stale_at(threshold, now))
            {
                tracing::warn!(
                    "Node {} evicted (no heartbeat for {:?})",
                    node.id,
                    node.silence_at(now)
                );
                removed.push(node);
            }
        }
        removed
    }
}
