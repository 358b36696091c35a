//! Storage Module Tests
//!
//! Validates atom placement and the storage node's local behaviour.
//!
//! ## Test Scopes
//! - **Partitioner**: determinism, strategy semantics and replica-set sizes.
//! - **DistributedStorageNode**: single-node store/fetch/remove for every strategy,
//!   idempotent replica writes, routing repair on departure, and rebalancing.
//!
//! *Note: multi-node replication and forwarding are covered by `tests/cluster_scenarios.rs`.*

#[cfg(test)]
mod tests {
    use crate::atom::{Atom, AtomSpace, Handle, LocalStore, MemoryStore, TruthValue};
    use crate::cluster::{ClusterEvent, ClusterMessage, ClusterResponse, DistributedCluster};
    use crate::config::ClusterConfig;
    use crate::membership::ClusterNodeInfo;
    use crate::storage::partitioner::{replica_nodes, responsible_node};
    use crate::storage::protocol::StoreAtomRequest;
    use crate::storage::{
        DistributedStorageNode, PartitionManager, PartitioningStrategy, ReplicationStrategy,
    };
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    fn nodes(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn storage_node(
        partitioning: PartitioningStrategy,
        replication: ReplicationStrategy,
    ) -> Arc<DistributedStorageNode> {
        let config = ClusterConfig {
            node_id: "node-a".to_string(),
            port: 0,
            partitioning,
            replication,
            ..ClusterConfig::default()
        };
        let cluster = DistributedCluster::new(config, AtomSpace::new());
        DistributedStorageNode::new(cluster, Arc::new(MemoryStore::new()))
    }

    fn add_peer(node: &DistributedStorageNode, id: &str, port: u16) {
        node.cluster()
            .membership()
            .record_heartbeat(ClusterNodeInfo::new(id, "127.0.0.1", port));
    }

    // ============================================================
    // PARTITIONER TESTS
    // ============================================================

    #[test]
    fn test_hash_based_is_deterministic_and_order_insensitive() {
        let empty = HashMap::new();
        for _ in 0..200 {
            let handle = Handle::new();
            let a = responsible_node(&handle, &nodes(&["n1", "n2", "n3"]), PartitioningStrategy::HashBased, &empty);
            let b = responsible_node(&handle, &nodes(&["n3", "n1", "n2"]), PartitioningStrategy::HashBased, &empty);
            assert_eq!(a, b, "Owner must not depend on node order");
            assert!(a.is_some());
        }
    }

    #[test]
    fn test_type_based_routes_like_hash_based() {
        let empty = HashMap::new();
        let cluster = nodes(&["n1", "n2", "n3", "n4"]);
        let handle = Handle::new();
        assert_eq!(
            responsible_node(&handle, &cluster, PartitioningStrategy::TypeBased, &empty),
            responsible_node(&handle, &cluster, PartitioningStrategy::HashBased, &empty)
        );
    }

    #[test]
    fn test_no_nodes_means_no_owner() {
        let owner = responsible_node(&Handle::new(), &[], PartitioningStrategy::RoundRobin, &HashMap::new());
        assert!(owner.is_none());
    }

    #[test]
    fn test_round_robin_uses_every_node() {
        let cluster = nodes(&["n1", "n2", "n3"]);
        let used: HashSet<String> = (0..1000)
            .filter_map(|_| {
                responsible_node(&Handle::new(), &cluster, PartitioningStrategy::RoundRobin, &HashMap::new())
            })
            .collect();
        assert_eq!(used.len(), 3);
    }

    #[test]
    fn test_load_balanced_picks_least_loaded() {
        let cluster = nodes(&["n1", "n2", "n3"]);
        let loads = HashMap::from([("n1".to_string(), 10), ("n2".to_string(), 2), ("n3".to_string(), 7)]);
        let owner = responsible_node(&Handle::new(), &cluster, PartitioningStrategy::LoadBalanced, &loads);
        assert_eq!(owner.as_deref(), Some("n2"));

        // Unknown nodes count as empty; ties break on node id.
        let owner = responsible_node(&Handle::new(), &cluster, PartitioningStrategy::LoadBalanced, &HashMap::new());
        assert_eq!(owner.as_deref(), Some("n1"));
    }

    #[test]
    fn test_replica_set_sizes() {
        let handle = Handle::new();
        let five = nodes(&["n1", "n2", "n3", "n4", "n5"]);

        assert!(replica_nodes(&handle, "n1", &five, ReplicationStrategy::SingleCopy, 3).is_empty());
        assert_eq!(replica_nodes(&handle, "n1", &five, ReplicationStrategy::PrimaryBackup, 2).len(), 1);
        assert_eq!(replica_nodes(&handle, "n1", &five, ReplicationStrategy::PrimaryBackup, 3).len(), 2);
        assert_eq!(replica_nodes(&handle, "n1", &five, ReplicationStrategy::PrimaryBackup, 9).len(), 4);
        assert_eq!(replica_nodes(&handle, "n1", &five, ReplicationStrategy::FullReplication, 1).len(), 4);
        // 5 nodes: majority is 3 copies, so 2 replicas.
        assert_eq!(replica_nodes(&handle, "n1", &five, ReplicationStrategy::QuorumBased, 1).len(), 2);

        let four = nodes(&["n1", "n2", "n3", "n4"]);
        assert_eq!(replica_nodes(&handle, "n1", &four, ReplicationStrategy::QuorumBased, 1).len(), 2);
    }

    #[test]
    fn test_replicas_exclude_owner_and_are_deterministic() {
        let cluster = nodes(&["n1", "n2", "n3", "n4"]);
        for _ in 0..100 {
            let handle = Handle::new();
            let first = replica_nodes(&handle, "n2", &cluster, ReplicationStrategy::PrimaryBackup, 3);
            let shuffled = nodes(&["n4", "n2", "n1", "n3"]);
            let second = replica_nodes(&handle, "n2", &shuffled, ReplicationStrategy::PrimaryBackup, 3);
            assert_eq!(first, second);
            assert!(!first.contains(&"n2".to_string()));
        }
    }

    #[test]
    fn test_placement_holds() {
        let manager = PartitionManager::new(PartitioningStrategy::HashBased, ReplicationStrategy::FullReplication, 1);
        let cluster = nodes(&["n1", "n2", "n3"]);
        let placement = manager.placement(&Handle::new(), &cluster, &HashMap::new()).unwrap();
        assert_eq!(placement.replicas.len(), 2);
        for node in &cluster {
            assert!(placement.holds(node));
        }
        assert!(!placement.holds("n9"));
    }

    // ============================================================
    // STORAGE NODE TESTS (single node, no network)
    // ============================================================

    #[tokio::test]
    async fn test_single_node_store_then_fetch_for_every_strategy() {
        let partitionings = [
            PartitioningStrategy::RoundRobin,
            PartitioningStrategy::HashBased,
            PartitioningStrategy::TypeBased,
            PartitioningStrategy::LoadBalanced,
        ];
        let replications = [
            ReplicationStrategy::SingleCopy,
            ReplicationStrategy::PrimaryBackup,
            ReplicationStrategy::FullReplication,
            ReplicationStrategy::QuorumBased,
        ];

        for partitioning in partitionings {
            for replication in replications {
                let node = storage_node(partitioning, replication);
                let atom = Atom::node("ConceptNode", "cat");
                assert!(node.store(&atom).await, "{:?}/{:?}", partitioning, replication);
                assert_eq!(node.fetch(&atom.handle).await, Some(atom.clone()));
                assert_eq!(node.recorded_owner(&atom.handle).as_deref(), Some("node-a"));
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_missing_atom_on_single_node() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::PrimaryBackup);
        assert!(node.fetch(&Handle::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_refreshes_cache_from_store() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::PrimaryBackup);
        let atom = Atom::node("ConceptNode", "cat");
        node.local_store().put(&atom);

        assert_eq!(node.fetch(&atom.handle).await, Some(atom.clone()));
        assert_eq!(node.fetch(&atom.handle).await, Some(atom));

        let stats = node.stats();
        assert_eq!(stats.lru_cache.hits, 1);
        assert_eq!(stats.operations.fetches, 2);
    }

    #[tokio::test]
    async fn test_remove_cleans_store_and_routing() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::PrimaryBackup);
        let atom = Atom::node("ConceptNode", "cat");
        node.store(&atom).await;

        assert!(node.remove(&atom.handle).await);
        assert!(node.fetch(&atom.handle).await.is_none());
        assert!(node.recorded_owner(&atom.handle).is_none());
        assert!(!node.remove(&atom.handle).await);
    }

    #[tokio::test]
    async fn test_replica_writes_are_idempotent() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::PrimaryBackup);
        add_peer(&node, "node-b", 7002);

        let atom = Atom::node("ConceptNode", "cat");
        assert!(node.store_replica(&atom, "op-1", "node-b"));
        let updated = atom.clone().with_truth_value(TruthValue::new(0.1, 0.9));
        assert!(node.store_replica(&updated, "op-1", "node-b"), "Duplicates report success");

        assert_eq!(node.local_store().get(&atom.handle), Some(atom.clone()));
        assert_eq!(node.recorded_owner(&atom.handle).as_deref(), Some("node-b"));
        assert_eq!(node.stats().operations.replicated_writes, 1);
    }

    #[tokio::test]
    async fn test_storage_messages_are_served_by_registered_handlers() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::SingleCopy);
        let cluster = node.cluster().clone();
        let atom = Atom::node("ConceptNode", "dog");
        let atom_data = cluster.transport().encode_atom(&atom).unwrap();

        let response = cluster
            .handle_message(ClusterMessage::StoreAtom {
                op_id: "op-7".to_string(),
                source_node: "node-b".to_string(),
                atom_data,
            })
            .await;
        assert_eq!(response, ClusterResponse::Success);
        assert!(node.local_store().contains(&atom.handle));

        // Served from the LocalStore, not the AtomSpace.
        let response = cluster
            .handle_message(ClusterMessage::FetchAllAtoms {
                source_node: "node-b".to_string(),
            })
            .await;
        let ClusterResponse::Atoms { atoms } = response else {
            panic!("Expected atoms, got {:?}", response);
        };
        assert_eq!(atoms.len(), 1);
        assert!(cluster.atomspace().is_empty());

        let response = cluster
            .handle_message(ClusterMessage::RemoveAtom {
                atom_handle: atom.handle,
                source_node: "node-b".to_string(),
                propagate: false,
            })
            .await;
        assert_eq!(response, ClusterResponse::Success);
        assert!(!node.local_store().contains(&atom.handle));
    }

    #[tokio::test]
    async fn test_bulk_store_and_load() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::PrimaryBackup);
        let source = AtomSpace::new();
        for i in 0..10 {
            source.add(Atom::node("ConceptNode", format!("c{}", i)));
        }
        assert_eq!(node.store_atomspace(&source).await, 10);
        assert_eq!(node.local_store().len(), 10);

        let target = AtomSpace::new();
        assert_eq!(node.load_atomspace(&target).await, 10);
        assert_eq!(target.len(), 10);
        assert_eq!(node.load_atomspace(&target).await, 0, "Already present atoms are skipped");
    }

    #[test]
    fn test_departed_owner_routing_is_reassigned() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::PrimaryBackup);
        add_peer(&node, "node-b", 7002);

        let atoms: Vec<Atom> = (0..5).map(|i| Atom::node("ConceptNode", format!("c{}", i))).collect();
        for (i, atom) in atoms.iter().enumerate() {
            node.store_replica(atom, &format!("op-{}", i), "node-b");
        }

        node.cluster().membership().remove("node-b");
        assert_eq!(node.handle_node_left("node-b"), 5);
        for atom in &atoms {
            assert_eq!(node.recorded_owner(&atom.handle).as_deref(), Some("node-a"));
            assert!(!node.recorded_replicas(&atom.handle).contains(&"node-b".to_string()));
        }
    }

    #[test]
    fn test_node_left_event_triggers_reassignment() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::PrimaryBackup);
        add_peer(&node, "node-b", 7002);
        let atom = Atom::node("ConceptNode", "cat");
        node.store_replica(&atom, "op-1", "node-b");

        node.cluster().membership().remove("node-b");
        node.cluster().emit_event(ClusterEvent::NodeLeft {
            node_id: "node-b".to_string(),
        });
        assert_eq!(node.recorded_owner(&atom.handle).as_deref(), Some("node-a"));
    }

    #[test]
    fn test_rebalance_moves_ownership_to_underloaded_nodes() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::SingleCopy);
        add_peer(&node, "node-b", 7002);
        add_peer(&node, "node-c", 7003);
        add_peer(&node, "node-d", 7004);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        node.cluster().on_event(move |event| sink.lock().push(event.clone()));

        // node-d owns everything, the rest own nothing.
        for i in 0..12 {
            let atom = Atom::node("ConceptNode", format!("c{}", i));
            node.store_replica(&atom, &format!("op-{}", i), "node-d");
        }

        let report = node.rebalance_cluster();
        assert_eq!(report.average_load, 3.0);
        assert_eq!(report.overloaded, vec!["node-d".to_string()]);
        assert_eq!(report.underloaded.len(), 3);
        assert_eq!(report.moved(), 9);

        let loads = node.owner_loads();
        for id in ["node-a", "node-b", "node-c", "node-d"] {
            assert_eq!(loads.get(id).copied(), Some(3), "{} should own 3 atoms", id);
        }
        assert_eq!(
            events.lock().as_slice(),
            &[ClusterEvent::PartitionRebalanced { moved: 9 }]
        );

        // Already balanced: nothing to do, no event.
        assert_eq!(node.rebalance_cluster().moved(), 0);
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn test_rebalance_needs_two_members() {
        let node = storage_node(PartitioningStrategy::HashBased, ReplicationStrategy::SingleCopy);
        assert_eq!(node.rebalance_cluster().moved(), 0);
    }

    // ============================================================
    // HTTP DTO TESTS
    // ============================================================

    #[test]
    fn test_store_request_builds_nodes_and_links() {
        let node_req: StoreAtomRequest =
            serde_json::from_str(r#"{"atom_type":"ConceptNode","name":"cat","tv":{"strength":0.5,"confidence":2.0}}"#)
                .unwrap();
        let atom = node_req.into_atom().unwrap();
        assert_eq!(atom.name(), Some("cat"));
        assert_eq!(atom.tv, TruthValue::new(0.5, 1.0));

        let target = Handle::new();
        let link_req = StoreAtomRequest {
            atom_type: "InheritanceLink".to_string(),
            name: None,
            outgoing: Some(vec![target]),
            tv: None,
        };
        assert_eq!(link_req.into_atom().unwrap().outgoing(), &[target]);

        let invalid = StoreAtomRequest {
            atom_type: "ConceptNode".to_string(),
            name: None,
            outgoing: None,
            tv: None,
        };
        assert!(invalid.into_atom().is_none());
    }
}
