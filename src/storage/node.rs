use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use uuid::Uuid;

use super::partitioner::{PartitionManager, Placement};
use super::types::{Migration, OperationCounters, RebalanceReport, StorageStats};
use crate::atom::{Atom, AtomSpace, ChangeOrigin, Handle, LocalStore};
use crate::cache::{AtomCache, PartitionInfo, PartitionInfoCache};
use crate::cluster::protocol::{
    MSG_FETCH_ALL_ATOMS, MSG_FETCH_ATOM, MSG_REMOVE_ATOM, MSG_REPLICATE_ATOM, MSG_STORE_ATOM,
};
use crate::cluster::{ClusterEvent, ClusterMessage, ClusterResponse, ClusterTransport, DistributedCluster};
use crate::error::ClusterError;
use crate::membership::now_ms;

const MAX_TRACKED_OPS: usize = 10_000;
const OVERLOAD_RATIO: f64 = 1.2;
const UNDERLOAD_RATIO: f64 = 0.8;

/// Where each handle lives, as far as this node knows.
#[derive(Default)]
struct RoutingTable {
    partitions: HashMap<Handle, String>,
    replicas: HashMap<Handle, Vec<String>>,
}

/// Partitioned, replicated atom storage on top of a `LocalStore`.
///
/// Writes are routed to the handle's owner, which pushes copies to its
/// replicas. Reads go through the LRU cache and the local store before asking
/// peers, starting with the ones routing hints point at.
pub struct DistributedStorageNode {
    cluster: Arc<DistributedCluster>,
    store: Arc<dyn LocalStore>,
    partitioner: PartitionManager,
    lru: AtomCache,
    partition_cache: PartitionInfoCache,
    routing: RwLock<RoutingTable>,
    processed_ops: DashMap<String, u64>,
    counters: OperationCounters,
}

impl DistributedStorageNode {
    /// Creates the node and registers its message handlers and departure hook
    /// with `cluster`.
    pub fn new(cluster: Arc<DistributedCluster>, store: Arc<dyn LocalStore>) -> Arc<Self> {
        let config = cluster.config();
        let node = Arc::new(Self {
            partitioner: PartitionManager::from_config(config),
            lru: AtomCache::new(config.cache.lru_capacity),
            partition_cache: PartitionInfoCache::new(
                config.cache.partition_capacity,
                config.cache.partition_ttl,
            ),
            routing: RwLock::new(RoutingTable::default()),
            processed_ops: DashMap::new(),
            counters: OperationCounters::default(),
            store,
            cluster,
        });
        node.register_handlers();
        node
    }

    fn register_handlers(self: &Arc<Self>) {
        for kind in [
            MSG_STORE_ATOM,
            MSG_REPLICATE_ATOM,
            MSG_FETCH_ATOM,
            MSG_REMOVE_ATOM,
            MSG_FETCH_ALL_ATOMS,
        ] {
            let weak = Arc::downgrade(self);
            self.cluster.register_handler(kind, move |message| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(node) => node.handle_message(message).await,
                        None => ClusterResponse::Failed {
                            reason: "storage node is gone".to_string(),
                        },
                    }
                }
            });
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        self.cluster.on_event(move |event| {
            if let Some(node) = weak.upgrade() {
                node.handle_cluster_event(event);
            }
        });
    }

    pub fn cluster(&self) -> &Arc<DistributedCluster> {
        &self.cluster
    }

    pub fn local_store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    fn local_id(&self) -> &str {
        self.cluster.local_id()
    }

    // --- Writes ---

    /// Persists `atom` at its owner (and replicas). `true` if it landed
    /// anywhere, locally or remotely.
    pub async fn store(&self, atom: &Atom) -> bool {
        OperationCounters::bump(&self.counters.stores);
        let nodes = self.cluster.membership().node_ids();
        if nodes.len() <= 1 {
            let written = self.write_local(atom);
            self.record_routing(atom.handle, self.local_id().to_string(), Vec::new());
            return written;
        }

        let Some(placement) = self.placement(&atom.handle, &nodes) else {
            return self.write_local(atom);
        };
        let op_id = Uuid::new_v4().to_string();

        if placement.owner == self.local_id() {
            return self.store_as_owner(atom, &op_id).await;
        }

        // Remember the id so the owner's replicate call back to us is a no-op.
        self.should_process(&op_id);
        let written = placement.holds(self.local_id()) && self.write_local(atom);
        self.record_routing(atom.handle, placement.owner.clone(), placement.replicas.clone());

        let forwarded = self.forward_to_owner(&placement.owner, atom, &op_id).await;
        written || forwarded
    }

    /// Owner-side write: persist locally, then push a copy to every replica.
    pub async fn store_as_owner(&self, atom: &Atom, op_id: &str) -> bool {
        if !self.should_process(op_id) {
            tracing::debug!("Store {} already processed", op_id);
            return true;
        }

        let nodes = self.cluster.membership().node_ids();
        let replicas = self
            .partitioner
            .replica_nodes(&atom.handle, self.local_id(), &nodes);
        let written = self.write_local(atom);
        self.record_routing(atom.handle, self.local_id().to_string(), replicas.clone());
        if replicas.is_empty() {
            return written;
        }

        let atom_data = match self.cluster.transport().encode_atom(atom) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Cannot encode atom {} for replication: {}", atom.handle, e);
                return written;
            }
        };

        let mut acknowledged = 0;
        for replica in &replicas {
            let message = ClusterMessage::ReplicateAtom {
                op_id: op_id.to_string(),
                source_node: self.local_id().to_string(),
                atom_data: atom_data.clone(),
            };
            match self.cluster.request_from(replica, &message).await {
                Some(ClusterResponse::Success) => acknowledged += 1,
                Some(other) => tracing::warn!(
                    "Replica {} on {}: {}",
                    replica,
                    atom.handle,
                    ClusterError::UnexpectedResponse(other.status().to_string())
                ),
                None => {}
            }
        }
        if acknowledged < replicas.len() {
            tracing::warn!(
                "Atom {} replicated to {}/{} replicas",
                atom.handle,
                acknowledged,
                replicas.len()
            );
        }
        written
    }

    /// Replica-side write pushed by `owner`.
    pub fn store_replica(&self, atom: &Atom, op_id: &str, owner: &str) -> bool {
        if !self.should_process(op_id) {
            return true;
        }
        let nodes = self.cluster.membership().node_ids();
        let replicas = self.partitioner.replica_nodes(&atom.handle, owner, &nodes);
        self.record_routing(atom.handle, owner.to_string(), replicas);
        let written = self.write_local(atom);
        if written {
            OperationCounters::bump(&self.counters.replicated_writes);
        }
        written
    }

    async fn forward_to_owner(&self, owner: &str, atom: &Atom, op_id: &str) -> bool {
        let atom_data = match self.cluster.transport().encode_atom(atom) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Cannot encode atom {} for forwarding: {}", atom.handle, e);
                return false;
            }
        };
        let message = ClusterMessage::StoreAtom {
            op_id: op_id.to_string(),
            source_node: self.local_id().to_string(),
            atom_data,
        };
        match self.cluster.request_from(owner, &message).await {
            Some(ClusterResponse::Success) => {
                OperationCounters::bump(&self.counters.forwarded_writes);
                true
            }
            Some(other) => {
                tracing::warn!(
                    "Owner {} on {}: {}",
                    owner,
                    atom.handle,
                    ClusterError::UnexpectedResponse(other.status().to_string())
                );
                false
            }
            None => false,
        }
    }

    fn write_local(&self, atom: &Atom) -> bool {
        if !self.store.put(atom) {
            tracing::error!("Local store refused atom {}", atom.handle);
            return false;
        }
        self.lru.put(atom.clone());
        OperationCounters::bump(&self.counters.local_writes);
        true
    }

    fn should_process(&self, op_id: &str) -> bool {
        if self.processed_ops.contains_key(op_id) {
            return false;
        }
        if self.processed_ops.len() > MAX_TRACKED_OPS {
            self.processed_ops.clear();
        }
        self.processed_ops.insert(op_id.to_string(), now_ms());
        true
    }

    // --- Reads ---

    /// Looks the atom up locally, then on the nodes routing hints name, then
    /// on every peer.
    pub async fn fetch(&self, handle: &Handle) -> Option<Atom> {
        OperationCounters::bump(&self.counters.fetches);
        if let Some(atom) = self.fetch_local(handle) {
            return Some(atom);
        }
        if self.cluster.membership().len() <= 1 {
            return None;
        }

        let mut tried = HashSet::from([self.local_id().to_string()]);

        if let Some(hint) = self.partition_cache.get(handle) {
            for node_id in std::iter::once(hint.node_id).chain(hint.replicas) {
                if let Some(atom) = self.fetch_from(&node_id, handle, &mut tried).await {
                    return Some(atom);
                }
            }
        }

        let hinted: Vec<String> = {
            let routing = self.routing.read();
            routing
                .partitions
                .get(handle)
                .cloned()
                .into_iter()
                .chain(routing.replicas.get(handle).cloned().unwrap_or_default())
                .collect()
        };
        for node_id in hinted {
            if let Some(atom) = self.fetch_from(&node_id, handle, &mut tried).await {
                return Some(atom);
            }
        }

        for peer in self.cluster.membership().peers() {
            if let Some(atom) = self.fetch_from(&peer.id, handle, &mut tried).await {
                return Some(atom);
            }
        }
        tracing::debug!("Atom {} not found on any of {} node(s)", handle, tried.len());
        None
    }

    /// Cache, then local store. Never touches the network.
    pub fn fetch_local(&self, handle: &Handle) -> Option<Atom> {
        if let Some(atom) = self.lru.get(handle) {
            return Some(atom);
        }
        let atom = self.store.get(handle)?;
        self.lru.put(atom.clone());
        Some(atom)
    }

    async fn fetch_from(
        &self,
        node_id: &str,
        handle: &Handle,
        tried: &mut HashSet<String>,
    ) -> Option<Atom> {
        if !tried.insert(node_id.to_string()) || !self.cluster.membership().contains(node_id) {
            return None;
        }
        let message = ClusterMessage::FetchAtom {
            atom_handle: *handle,
        };
        let Some(ClusterResponse::Found { atom_data }) =
            self.cluster.request_from(node_id, &message).await
        else {
            return None;
        };
        match ClusterTransport::decode_atom(&atom_data) {
            Ok(atom) => {
                OperationCounters::bump(&self.counters.remote_fetches);
                self.backfill(&atom, node_id);
                Some(atom)
            }
            Err(e) => {
                tracing::warn!("Undecodable atom {} from {}: {}", handle, node_id, e);
                None
            }
        }
    }

    fn backfill(&self, atom: &Atom, found_on: &str) {
        self.lru.put(atom.clone());
        let (owner, replicas) = {
            let mut routing = self.routing.write();
            let recorded = routing
                .partitions
                .get(&atom.handle)
                .filter(|owner| self.cluster.membership().contains(owner.as_str()))
                .cloned();
            let owner = recorded.unwrap_or_else(|| found_on.to_string());
            routing.partitions.insert(atom.handle, owner.clone());
            let replicas = routing
                .replicas
                .get(&atom.handle)
                .cloned()
                .unwrap_or_default();
            (owner, replicas)
        };
        self.partition_cache.put(atom.handle, owner, replicas, true);
    }

    // --- Removal ---

    /// Drops the atom locally and from wherever this node knows it lives.
    pub async fn remove(&self, handle: &Handle) -> bool {
        OperationCounters::bump(&self.counters.removes);
        self.lru.invalidate(handle);
        self.partition_cache.invalidate(handle);
        let removed_locally = self.store.delete(handle);
        let (recorded_owner, mut replicas) = self.take_routing(handle);
        let nodes = self.cluster.membership().node_ids();

        let owner = recorded_owner
            .or_else(|| self.placement(handle, &nodes).map(|placement| placement.owner));

        let removed_remotely = match owner {
            Some(owner) if owner == self.local_id() => {
                if replicas.is_empty() {
                    replicas = self.partitioner.replica_nodes(handle, &owner, &nodes);
                }
                self.remove_from_replicas(handle, &replicas).await > 0
            }
            Some(owner) => {
                let message = ClusterMessage::RemoveAtom {
                    atom_handle: *handle,
                    source_node: self.local_id().to_string(),
                    propagate: true,
                };
                self.cluster
                    .request_from(&owner, &message)
                    .await
                    .is_some_and(|response| response.is_success())
            }
            None => false,
        };
        removed_locally || removed_remotely
    }

    async fn remove_from_replicas(&self, handle: &Handle, replicas: &[String]) -> usize {
        let mut removed = 0;
        for replica in replicas.iter().filter(|r| r.as_str() != self.local_id()) {
            let message = ClusterMessage::RemoveAtom {
                atom_handle: *handle,
                source_node: self.local_id().to_string(),
                propagate: false,
            };
            if self
                .cluster
                .request_from(replica, &message)
                .await
                .is_some_and(|response| response.is_success())
            {
                removed += 1;
            }
        }
        removed
    }

    fn take_routing(&self, handle: &Handle) -> (Option<String>, Vec<String>) {
        let mut routing = self.routing.write();
        let owner = routing.partitions.remove(handle);
        let replicas = routing.replicas.remove(handle).unwrap_or_default();
        (owner, replicas)
    }

    // --- Bulk ---

    /// Stores every atom of `space`. Returns how many were persisted somewhere.
    pub async fn store_atomspace(&self, space: &AtomSpace) -> usize {
        let mut stored = 0;
        for atom in space.atoms() {
            if self.store(&atom).await {
                stored += 1;
            }
        }
        tracing::info!("Stored {}/{} atom(s) from the atomspace", stored, space.len());
        stored
    }

    /// Loads local atoms plus every peer's atoms into `space`. Loaded atoms
    /// enter with `Remote` origin, so they are not re-broadcast. Returns the
    /// number of atoms added.
    pub async fn load_atomspace(&self, space: &AtomSpace) -> usize {
        let local: Vec<Atom> = self.store.scan().collect();
        let mut loaded = 0;
        for atom in local {
            if !space.contains(&atom.handle) && space.apply_add(atom, ChangeOrigin::Remote).is_some() {
                loaded += 1;
            }
        }

        for peer in self.cluster.membership().peers() {
            let message = ClusterMessage::FetchAllAtoms {
                source_node: self.local_id().to_string(),
            };
            let Some(ClusterResponse::Atoms { atoms }) =
                self.cluster.request_from(&peer.id, &message).await
            else {
                tracing::warn!("Peer {} returned no atoms", peer.id);
                continue;
            };
            for payload in atoms {
                match ClusterTransport::decode_atom(&payload) {
                    Ok(atom) if !space.contains(&atom.handle) => {
                        space.apply_add(atom, ChangeOrigin::Remote);
                        loaded += 1;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Skipping undecodable atom from {}: {}", peer.id, e),
                }
            }
        }
        tracing::info!("Loaded {} atom(s) into the atomspace", loaded);
        loaded
    }

    // --- Inbound storage messages ---

    async fn handle_message(&self, message: ClusterMessage) -> ClusterResponse {
        match message {
            ClusterMessage::StoreAtom {
                op_id,
                source_node,
                atom_data,
            } => match ClusterTransport::decode_atom(&atom_data) {
                Ok(atom) => {
                    tracing::debug!("Owner write for {} forwarded by {}", atom.handle, source_node);
                    if self.store_as_owner(&atom, &op_id).await {
                        ClusterResponse::Success
                    } else {
                        ClusterResponse::Failed {
                            reason: "local store refused atom".to_string(),
                        }
                    }
                }
                Err(e) => ClusterResponse::Failed {
                    reason: e.to_string(),
                },
            },
            ClusterMessage::ReplicateAtom {
                op_id,
                source_node,
                atom_data,
            } => match ClusterTransport::decode_atom(&atom_data) {
                Ok(atom) if self.store_replica(&atom, &op_id, &source_node) => {
                    ClusterResponse::Success
                }
                Ok(_) => ClusterResponse::Failed {
                    reason: "local store refused atom".to_string(),
                },
                Err(e) => ClusterResponse::Failed {
                    reason: e.to_string(),
                },
            },
            ClusterMessage::FetchAtom { atom_handle } => match self.fetch_local(&atom_handle) {
                Some(atom) => match self.cluster.transport().encode_atom(&atom) {
                    Ok(atom_data) => ClusterResponse::Found { atom_data },
                    Err(e) => ClusterResponse::Failed {
                        reason: e.to_string(),
                    },
                },
                None => ClusterResponse::NotFound,
            },
            ClusterMessage::RemoveAtom {
                atom_handle,
                propagate,
                ..
            } => self.remove_on_request(&atom_handle, propagate).await,
            ClusterMessage::FetchAllAtoms { .. } => {
                let atoms: Vec<Atom> = self.store.scan().collect();
                ClusterResponse::Atoms {
                    atoms: self.cluster.encode_all(atoms),
                }
            }
            other => ClusterResponse::Rejected {
                reason: format!("storage does not handle {}", other.kind()),
            },
        }
    }

    async fn remove_on_request(&self, handle: &Handle, propagate: bool) -> ClusterResponse {
        self.lru.invalidate(handle);
        self.partition_cache.invalidate(handle);
        let removed = self.store.delete(handle);
        let (_, mut replicas) = self.take_routing(handle);

        let mut fanned_out = 0;
        if propagate {
            if replicas.is_empty() {
                let nodes = self.cluster.membership().node_ids();
                replicas = self.partitioner.replica_nodes(handle, self.local_id(), &nodes);
            }
            fanned_out = self.remove_from_replicas(handle, &replicas).await;
        }

        if removed || fanned_out > 0 {
            ClusterResponse::Success
        } else {
            ClusterResponse::NotFound
        }
    }

    // --- Membership changes & rebalancing ---

    pub fn handle_cluster_event(&self, event: &ClusterEvent) {
        if let ClusterEvent::NodeLeft { node_id } = event {
            self.handle_node_left(node_id);
        }
    }

    /// Re-points routing for atoms owned by `node_id`. Data is not re-replicated.
    pub fn handle_node_left(&self, node_id: &str) -> usize {
        let invalidated = self.partition_cache.invalidate_node(node_id);
        let nodes = self.cluster.membership().node_ids();
        let loads = self.owner_loads();

        let mut routing = self.routing.write();
        let orphans: Vec<Handle> = routing
            .partitions
            .iter()
            .filter(|(_, owner)| owner.as_str() == node_id)
            .map(|(handle, _)| *handle)
            .collect();

        for handle in &orphans {
            match self.partitioner.placement(handle, &nodes, &loads) {
                Some(placement) => {
                    routing.partitions.insert(*handle, placement.owner);
                    routing.replicas.insert(*handle, placement.replicas);
                }
                None => {
                    routing.partitions.remove(handle);
                    routing.replicas.remove(handle);
                }
            }
        }
        for replicas in routing.replicas.values_mut() {
            replicas.retain(|replica| replica != node_id);
        }
        routing.replicas.retain(|_, replicas| !replicas.is_empty());

        tracing::info!(
            "Node {} left: {} routing entries reassigned, {} cache hints dropped",
            node_id,
            orphans.len(),
            invalidated
        );
        orphans.len()
    }

    /// Moves ownership from nodes above 120% of the average load to nodes
    /// below 80%. Routing only; the atoms themselves are not migrated.
    pub fn rebalance_cluster(&self) -> RebalanceReport {
        let nodes = self.cluster.membership().node_ids();
        if nodes.len() < 2 {
            return RebalanceReport::default();
        }

        let mut owned: BTreeMap<String, Vec<Handle>> =
            nodes.iter().map(|node| (node.clone(), Vec::new())).collect();
        {
            let routing = self.routing.read();
            for (handle, owner) in &routing.partitions {
                if let Some(handles) = owned.get_mut(owner) {
                    handles.push(*handle);
                }
            }
        }
        for handles in owned.values_mut() {
            handles.sort();
        }

        let total: usize = owned.values().map(Vec::len).sum();
        let average = total as f64 / nodes.len() as f64;
        let mut report = RebalanceReport {
            average_load: average,
            ..RebalanceReport::default()
        };
        for (node, handles) in &owned {
            let load = handles.len() as f64;
            if load > average * OVERLOAD_RATIO {
                report.overloaded.push(node.clone());
            } else if load < average * UNDERLOAD_RATIO {
                report.underloaded.push(node.clone());
            }
        }

        let (overloaded, underloaded) = (report.overloaded.clone(), report.underloaded.clone());
        for from in &overloaded {
            for to in &underloaded {
                while owned[from].len() as f64 > average && (owned[to].len() as f64) < average {
                    let Some(handle) = owned.get_mut(from).and_then(Vec::pop) else {
                        break;
                    };
                    if let Some(handles) = owned.get_mut(to) {
                        handles.push(handle);
                    }
                    report.migrations.push(Migration {
                        handle,
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        if report.migrations.is_empty() {
            return report;
        }
        {
            let mut routing = self.routing.write();
            for migration in &report.migrations {
                let replicas = self
                    .partitioner
                    .replica_nodes(&migration.handle, &migration.to, &nodes);
                routing
                    .partitions
                    .insert(migration.handle, migration.to.clone());
                routing.replicas.insert(migration.handle, replicas);
                self.partition_cache.invalidate(&migration.handle);
            }
        }
        tracing::info!(
            "Rebalanced {} partition(s) (average load {:.1})",
            report.moved(),
            average
        );
        self.cluster.emit_event(ClusterEvent::PartitionRebalanced {
            moved: report.moved(),
        });
        report
    }

    // --- Routing helpers ---

    fn placement(&self, handle: &Handle, nodes: &[String]) -> Option<Placement> {
        self.partitioner.placement(handle, nodes, &self.owner_loads())
    }

    /// Atoms owned per node according to the local partition map.
    pub fn owner_loads(&self) -> HashMap<String, usize> {
        let routing = self.routing.read();
        let mut loads = HashMap::new();
        for owner in routing.partitions.values() {
            *loads.entry(owner.clone()).or_insert(0) += 1;
        }
        loads
    }

    fn record_routing(&self, handle: Handle, owner: String, replicas: Vec<String>) {
        let mut routing = self.routing.write();
        routing.partitions.insert(handle, owner);
        if replicas.is_empty() {
            routing.replicas.remove(&handle);
        } else {
            routing.replicas.insert(handle, replicas);
        }
    }

    pub fn recorded_owner(&self, handle: &Handle) -> Option<String> {
        self.routing.read().partitions.get(handle).cloned()
    }

    /// Cached location hint for `handle`, if one is live.
    pub fn partition_hint(&self, handle: &Handle) -> Option<PartitionInfo> {
        self.partition_cache.get(handle)
    }

    pub fn recorded_replicas(&self, handle: &Handle) -> Vec<String> {
        self.routing
            .read()
            .replicas
            .get(handle)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StorageStats {
        let (partition_entries, replica_entries) = {
            let routing = self.routing.read();
            (routing.partitions.len(), routing.replicas.len())
        };
        StorageStats {
            node_id: self.local_id().to_string(),
            cluster_size: self.cluster.membership().len(),
            local_atoms: self.store.len(),
            partition_entries,
            replica_entries,
            pending_sync_operations: self.cluster.pending_operations(),
            lru_cache: self.lru.stats(),
            partition_cache: self.partition_cache.stats(),
            heartbeat: self.cluster.heartbeat_stats(),
            operations: self.counters.snapshot(),
        }
    }
}
