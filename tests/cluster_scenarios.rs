//! Multi-node scenarios on loopback.
//!
//! Every node binds `127.0.0.1:0` inside the test's runtime, with short
//! heartbeat and sync intervals so propagation settles in well under a second.

use distributed_atomspace::atom::{Atom, AtomSpace, Handle, MemoryStore, TruthValue};
use distributed_atomspace::cluster::{ClusterEvent, DistributedCluster};
use distributed_atomspace::config::{ClusterConfig, HeartbeatConfig};
use distributed_atomspace::consistency::{ConflictKind, ConflictResolutionStrategy};
use distributed_atomspace::storage::partitioner::responsible_node;
use distributed_atomspace::storage::{
    DistributedStorageNode, PartitioningStrategy, ReplicationStrategy,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const CLUSTER_ID: &str = "scenario-cluster";

fn node_config(node_id: &str) -> ClusterConfig {
    ClusterConfig {
        cluster_id: CLUSTER_ID.to_string(),
        node_id: node_id.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        partitioning: PartitioningStrategy::HashBased,
        replication: ReplicationStrategy::PrimaryBackup,
        replication_factor: 2,
        conflict_resolution: ConflictResolutionStrategy::LastWriteWins,
        heartbeat: HeartbeatConfig {
            base_interval: Duration::from_millis(200),
            min_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(1),
            stability_threshold: 5,
        },
        stale_threshold: Duration::from_secs(5),
        sync_interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        ..ClusterConfig::default()
    }
}

struct TestNode {
    cluster: Arc<DistributedCluster>,
    storage: Arc<DistributedStorageNode>,
    port: u16,
}

async fn start_node(config: ClusterConfig) -> TestNode {
    let cluster = DistributedCluster::new(config, AtomSpace::new());
    let addr = cluster.start().await.expect("node should bind");
    let storage = DistributedStorageNode::new(cluster.clone(), Arc::new(MemoryStore::new()));
    TestNode {
        cluster,
        storage,
        port: addr.port(),
    }
}

/// Starts `ids.len()` nodes; every node after the first joins through the first.
async fn start_cluster(ids: &[&str]) -> Vec<TestNode> {
    start_cluster_with(ids, |_| {}).await
}

async fn start_cluster_with(ids: &[&str], configure: impl Fn(&mut ClusterConfig)) -> Vec<TestNode> {
    let mut nodes = Vec::new();
    for id in ids {
        let mut config = node_config(id);
        configure(&mut config);
        let node = start_node(config).await;
        if let Some(seed) = nodes.first() {
            let seed: &TestNode = seed;
            assert!(
                node.cluster.join_cluster("127.0.0.1", seed.port).await,
                "{} failed to join",
                id
            );
        }
        nodes.push(node);
    }

    let expected = ids.len();
    let converged = wait_until(|| {
        nodes
            .iter()
            .all(|node| node.cluster.membership().len() == expected)
    })
    .await;
    assert!(converged, "membership did not converge to {} nodes", expected);
    nodes
}

async fn stop_all(nodes: &[TestNode]) {
    for node in nodes {
        node.cluster.stop().await;
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

fn record_events(cluster: &DistributedCluster) -> Arc<Mutex<Vec<ClusterEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    cluster.on_event(move |event| sink.lock().push(event.clone()));
    events
}

// ============================================================
// PARTITIONING & REPLICATION
// ============================================================

#[tokio::test]
async fn test_primary_backup_places_each_atom_on_exactly_two_nodes() {
    let nodes = start_cluster(&["node-1", "node-2", "node-3"]).await;
    let ids: Vec<String> = vec!["node-1".into(), "node-2".into(), "node-3".into()];

    let mut handles = Vec::new();
    for i in 0..100 {
        let atom = Atom::node("ConceptNode", format!("concept-{}", i));
        let writer = &nodes[i % nodes.len()];
        assert!(writer.storage.store(&atom).await, "store {} failed", i);
        handles.push(atom.handle);
    }

    for handle in &handles {
        let owner = responsible_node(handle, &ids, PartitioningStrategy::HashBased, &HashMap::new())
            .expect("three nodes always yield an owner");
        let holders: Vec<&str> = nodes
            .iter()
            .filter(|node| node.storage.local_store().contains(handle))
            .map(|node| node.cluster.local_id())
            .collect();

        assert!(holders.contains(&owner.as_str()), "owner {} lacks {}", owner, handle);
        assert_eq!(holders.len(), 2, "{} held by {:?}", handle, holders);
    }

    // Any node can read any atom.
    for handle in handles.iter().take(20) {
        for node in &nodes {
            assert!(node.storage.fetch(handle).await.is_some());
        }
    }

    stop_all(&nodes).await;
}

#[tokio::test]
async fn test_remove_from_non_owner_clears_every_copy() {
    let nodes = start_cluster(&["node-1", "node-2", "node-3"]).await;

    let atoms: Vec<Atom> = (0..10)
        .map(|i| Atom::node("ConceptNode", format!("doomed-{}", i)))
        .collect();
    for atom in &atoms {
        assert!(nodes[0].storage.store(atom).await);
    }
    for atom in &atoms {
        assert!(nodes[1].storage.remove(&atom.handle).await);
    }

    for atom in &atoms {
        for node in &nodes {
            assert!(
                !node.storage.local_store().contains(&atom.handle),
                "{} still holds {}",
                node.cluster.local_id(),
                atom.handle
            );
        }
    }
    stop_all(&nodes).await;
}

#[tokio::test]
async fn test_owner_remove_without_routing_reaches_backup() {
    let nodes = start_cluster(&["node-1", "node-2"]).await;
    let ids: Vec<String> = vec!["node-1".into(), "node-2".into()];

    // Placed by hand, so node-1 has no routing entry for it.
    let atom = (0..)
        .map(|i| Atom::node("ConceptNode", format!("unrouted-{}", i)))
        .find(|atom| {
            responsible_node(&atom.handle, &ids, PartitioningStrategy::HashBased, &HashMap::new())
                .as_deref()
                == Some("node-1")
        })
        .expect("some handle hashes to node-1");
    for node in &nodes {
        assert!(node.storage.local_store().put(&atom));
    }
    assert_eq!(nodes[0].storage.recorded_owner(&atom.handle), None);

    assert!(nodes[0].storage.remove(&atom.handle).await);
    for node in &nodes {
        assert!(
            !node.storage.local_store().contains(&atom.handle),
            "{} still holds {}",
            node.cluster.local_id(),
            atom.handle
        );
    }
    stop_all(&nodes).await;
}

#[tokio::test]
async fn test_remote_fetch_backfills_caches_and_routing() {
    let nodes = start_cluster_with(&["node-1", "node-2"], |config| {
        config.cache.lru_capacity = 1;
    })
    .await;
    let (reader, holder) = (&nodes[0].storage, &nodes[1].storage);

    let first = Atom::node("ConceptNode", "backfilled-first");
    let second = Atom::node("ConceptNode", "backfilled-second");
    assert!(holder.local_store().put(&first));
    assert!(holder.local_store().put(&second));

    let before = reader.stats();
    assert_eq!(reader.fetch(&first.handle).await, Some(first.clone()));
    let after = reader.stats();
    assert_eq!(after.operations.remote_fetches, before.operations.remote_fetches + 1);
    assert_eq!(after.partition_cache.size, before.partition_cache.size + 1);
    assert_eq!(reader.recorded_owner(&first.handle).as_deref(), Some("node-2"));
    let hint = reader
        .partition_hint(&first.handle)
        .expect("fetch leaves a location hint");
    assert!(hint.verified);
    assert_eq!(hint.node_id, "node-2");

    // Served from the LRU without another round trip.
    let before = reader.stats();
    assert_eq!(reader.fetch(&first.handle).await, Some(first.clone()));
    let after = reader.stats();
    assert_eq!(after.lru_cache.hits, before.lru_cache.hits + 1);
    assert_eq!(after.operations.remote_fetches, before.operations.remote_fetches);

    // Evict `first` from the single-slot LRU; the hint then routes the refetch.
    assert_eq!(reader.fetch(&second.handle).await, Some(second.clone()));
    let before = reader.stats();
    assert_eq!(reader.fetch(&first.handle).await, Some(first.clone()));
    let after = reader.stats();
    assert_eq!(after.partition_cache.hits, before.partition_cache.hits + 1);
    assert_eq!(after.operations.remote_fetches, before.operations.remote_fetches + 1);

    stop_all(&nodes).await;
}

// ============================================================
// MEMBERSHIP CHANGES
// ============================================================

#[tokio::test]
async fn test_departed_node_data_remains_reachable() {
    let nodes = start_cluster(&["node-1", "node-2", "node-3"]).await;
    let survivor_events = record_events(&nodes[0].cluster);

    let mut handles = Vec::new();
    for i in 0..30 {
        let atom = Atom::node("ConceptNode", format!("durable-{}", i));
        assert!(nodes[0].storage.store(&atom).await);
        handles.push(atom.handle);
    }

    nodes[2].cluster.stop().await;
    assert!(wait_until(|| !nodes[0].cluster.membership().contains("node-3")).await);
    assert!(wait_until(|| !nodes[1].cluster.membership().contains("node-3")).await);

    let left: Vec<ClusterEvent> = survivor_events
        .lock()
        .iter()
        .filter(|event| matches!(event, ClusterEvent::NodeLeft { .. }))
        .cloned()
        .collect();
    assert_eq!(
        left,
        vec![ClusterEvent::NodeLeft {
            node_id: "node-3".to_string()
        }]
    );

    for handle in &handles {
        assert_ne!(
            nodes[0].storage.recorded_owner(handle).as_deref(),
            Some("node-3"),
            "routing still points at the departed node"
        );
        assert!(
            nodes[0].storage.fetch(handle).await.is_some(),
            "{} lost after departure",
            handle
        );
    }

    stop_all(&nodes[..2]).await;
}

fn fast_eviction_config(node_id: &str) -> ClusterConfig {
    let mut config = node_config(node_id);
    config.heartbeat = HeartbeatConfig {
        base_interval: Duration::from_millis(150),
        min_interval: Duration::from_millis(100),
        max_interval: Duration::from_millis(300),
        stability_threshold: 5,
    };
    config.stale_threshold = Duration::from_secs(1);
    config
}

#[tokio::test]
async fn test_crashed_node_is_evicted_and_its_atoms_reassigned() {
    let survivors = vec![
        start_node(fast_eviction_config("node-1")).await,
        start_node(fast_eviction_config("node-2")).await,
    ];
    let seed_port = survivors[0].port;
    assert!(survivors[1].cluster.join_cluster("127.0.0.1", seed_port).await);
    let events = record_events(&survivors[0].cluster);

    // node-3 lives on its own runtime so it can be killed without a departure notice.
    let crash_runtime = tokio::runtime::Runtime::new().expect("runtime");
    let crashed = crash_runtime
        .spawn(async move {
            let node = start_node(fast_eviction_config("node-3")).await;
            assert!(node.cluster.join_cluster("127.0.0.1", seed_port).await);
            node
        })
        .await
        .expect("node-3 should start");
    assert!(
        wait_until(|| {
            survivors.iter().all(|node| node.cluster.membership().len() == 3)
                && crashed.cluster.membership().len() == 3
        })
        .await
    );

    let mut orphaned = Vec::new();
    for i in 0..60 {
        let atom = Atom::node("ConceptNode", format!("crash-{}", i));
        assert!(survivors[0].storage.store(&atom).await);
        if survivors[0].storage.recorded_owner(&atom.handle).as_deref() == Some("node-3") {
            orphaned.push(atom.handle);
        }
    }
    assert!(!orphaned.is_empty(), "no atom landed on node-3");

    crash_runtime.shutdown_background();

    assert!(wait_until(|| !survivors[0].cluster.membership().contains("node-3")).await);
    let left = events
        .lock()
        .iter()
        .filter(|event| matches!(event, ClusterEvent::NodeLeft { node_id } if node_id == "node-3"))
        .count();
    assert_eq!(left, 1);

    for handle in &orphaned {
        let owner = survivors[0].storage.recorded_owner(handle);
        assert!(
            matches!(owner.as_deref(), Some("node-1") | Some("node-2")),
            "{} routed to {:?}",
            handle,
            owner
        );
        // Factor-2 replication left a copy on a survivor.
        assert!(survivors[0].storage.fetch(handle).await.is_some());
    }

    stop_all(&survivors).await;
}

#[tokio::test]
async fn test_join_with_foreign_cluster_id_is_rejected() {
    let nodes = start_cluster(&["node-1"]).await;

    let mut foreign = node_config("intruder");
    foreign.cluster_id = "some-other-cluster".to_string();
    let intruder = start_node(foreign).await;

    assert!(!intruder.cluster.join_cluster("127.0.0.1", nodes[0].port).await);
    assert!(!nodes[0].cluster.membership().contains("intruder"));

    intruder.cluster.stop().await;
    stop_all(&nodes).await;
}

// ============================================================
// ATOMSPACE SYNCHRONIZATION
// ============================================================

#[tokio::test]
async fn test_local_changes_propagate_to_peers() {
    let nodes = start_cluster(&["node-1", "node-2"]).await;
    let (a, b) = (&nodes[0].cluster, &nodes[1].cluster);

    let small = a.add_atom(Atom::node("ConceptNode", "small"));
    let large = a.add_atom(Atom::node("ConceptNode", "x".repeat(2048)));
    assert!(wait_until(|| b.atomspace().contains(&small) && b.atomspace().contains(&large)).await);
    assert_eq!(b.atomspace().get(&large), a.atomspace().get(&large));

    let tv = TruthValue::new(0.25, 0.75);
    assert!(a.set_truth_value(&small, tv));
    assert!(wait_until(|| b.atomspace().get(&small).map(|atom| atom.tv) == Some(tv)).await);

    assert!(a.remove_atom(&small));
    assert!(wait_until(|| !b.atomspace().contains(&small)).await);

    stop_all(&nodes).await;
}

#[tokio::test]
async fn test_concurrent_truth_value_updates_resolve_last_write_wins() {
    let nodes = start_cluster(&["node-1", "node-2"]).await;
    let (a, b) = (&nodes[0].cluster, &nodes[1].cluster);
    let a_events = record_events(a);
    let b_events = record_events(b);

    let handle: Handle = a.add_atom(Atom::node("ConceptNode", "contested"));
    assert!(wait_until(|| b.atomspace().contains(&handle)).await);

    // No await in between, so neither update has been flushed when the other is made.
    let tv_a = TruthValue::new(0.9, 0.5);
    let tv_b = TruthValue::new(0.1, 0.6);
    assert!(a.set_truth_value(&handle, tv_a));
    assert!(b.set_truth_value(&handle, tv_b));

    let resolved = |events: &Arc<Mutex<Vec<ClusterEvent>>>| {
        events.lock().iter().any(|event| {
            matches!(
                event,
                ClusterEvent::ConflictResolved {
                    kind: ConflictKind::ConcurrentModification,
                    ..
                }
            )
        })
    };
    assert!(wait_until(|| resolved(&a_events) && resolved(&b_events)).await);

    // Last-write-wins applies the incoming version on each side, so the writers swap.
    assert_eq!(a.atomspace().get(&handle).map(|atom| atom.tv), Some(tv_b));
    assert_eq!(b.atomspace().get(&handle).map(|atom| atom.tv), Some(tv_a));

    stop_all(&nodes).await;
}

#[tokio::test]
async fn test_concurrent_updates_converge_under_vector_clock_strategy() {
    let nodes = start_cluster_with(&["node-1", "node-2"], |config| {
        config.conflict_resolution = ConflictResolutionStrategy::VectorClock;
    })
    .await;
    let (a, b) = (&nodes[0].cluster, &nodes[1].cluster);
    let a_events = record_events(a);
    let b_events = record_events(b);

    let handle: Handle = a.add_atom(Atom::node("ConceptNode", "agreed"));
    assert!(wait_until(|| b.atomspace().contains(&handle)).await);

    let tv_a = TruthValue::new(0.9, 0.5);
    let tv_b = TruthValue::new(0.1, 0.6);
    assert!(a.set_truth_value(&handle, tv_a));
    assert!(b.set_truth_value(&handle, tv_b));

    let resolved = |events: &Arc<Mutex<Vec<ClusterEvent>>>| {
        events
            .lock()
            .iter()
            .any(|event| matches!(event, ClusterEvent::ConflictResolved { .. }))
    };
    assert!(wait_until(|| resolved(&a_events) && resolved(&b_events)).await);

    let tv_of = |cluster: &Arc<DistributedCluster>| cluster.atomspace().get(&handle).map(|atom| atom.tv);
    let agreed = wait_until(|| {
        let (on_a, on_b) = (tv_of(a), tv_of(b));
        on_a == on_b && (on_a == Some(tv_a) || on_a == Some(tv_b))
    })
    .await;
    assert!(agreed, "replicas disagree: {:?} vs {:?}", tv_of(a), tv_of(b));

    stop_all(&nodes).await;
}
