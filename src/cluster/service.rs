use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use super::events::{ClusterEvent, EventBus};
use super::protocol::{
    AtomPayload, ClusterMessage, ClusterResponse, SyncOperation, SyncOperationType,
};
use super::registry::MessageHandlerRegistry;
use super::transport::{ClusterTransport, read_frame, write_frame};
use crate::atom::{Atom, AtomEvent, AtomSpace, ChangeOrigin, Handle, SubscriptionId, TruthValue};
use crate::config::ClusterConfig;
use crate::consistency::{
    CausalTracker, ConflictCheck, ConflictInfo, ConflictKind, ConflictResolver, VectorClock,
};
use crate::error::{ClusterError, Result};
use crate::membership::{
    AdaptiveHeartbeatController, ClusterMembership, ClusterNodeInfo, HeartbeatStats, NodeStatus,
};

const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// One member of a distributed AtomSpace cluster.
///
/// Owns the membership table, the adaptive heartbeat, causal tracking and the
/// queue of local mutations awaiting propagation. Local AtomSpace changes are
/// picked up through an observer and shipped to every peer by the sync loop.
pub struct DistributedCluster {
    config: ClusterConfig,
    membership: ClusterMembership,
    heartbeat: Mutex<AdaptiveHeartbeatController>,
    space: Arc<AtomSpace>,
    causal: CausalTracker,
    resolver: ConflictResolver,
    pending: Mutex<Vec<SyncOperation>>,
    transport: ClusterTransport,
    handlers: MessageHandlerRegistry,
    events: EventBus,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    last_member_count: AtomicUsize,
    subscription: SubscriptionId,
}

impl DistributedCluster {
    pub fn new(config: ClusterConfig, space: Arc<AtomSpace>) -> Arc<Self> {
        let node_id = config.resolve_node_id();
        let local = ClusterNodeInfo::new(node_id.clone(), config.host.clone(), config.port);
        let (shutdown, _) = watch::channel(false);

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let observer = weak.clone();
            let subscription = space.on_change(move |event, atom, origin| {
                if let Some(cluster) = observer.upgrade() {
                    cluster.on_local_change(event, atom, origin);
                }
            });

            Self {
                heartbeat: Mutex::new(AdaptiveHeartbeatController::for_stale_threshold(
                    &config.heartbeat,
                    config.stale_threshold,
                )),
                causal: CausalTracker::new(node_id),
                resolver: ConflictResolver::new(config.conflict_resolution),
                transport: ClusterTransport::new(config.compression.clone(), config.request_timeout),
                membership: ClusterMembership::new(local),
                pending: Mutex::new(Vec::new()),
                handlers: MessageHandlerRegistry::new(),
                events: EventBus::default(),
                running: AtomicBool::new(false),
                shutdown,
                tasks: Mutex::new(Vec::new()),
                last_member_count: AtomicUsize::new(1),
                subscription,
                space,
                config,
            }
        })
    }

    // --- Lifecycle ---

    /// Binds the listener and spawns the server, heartbeat and sync loops.
    /// Returns the bound address (useful with port 0).
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr> {
        if self.is_running() {
            return Err(ClusterError::Rejected(format!(
                "node {} is already running",
                self.local_id()
            )));
        }

        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        self.membership.update_local(|local| local.port = addr.port());
        self.membership.set_local_status(NodeStatus::Active);
        self.last_member_count
            .store(self.membership.len(), Ordering::SeqCst);
        self.shutdown.send_replace(false);
        self.running.store(true, Ordering::SeqCst);

        let server = tokio::spawn(self.clone().server_loop(listener, self.shutdown.subscribe()));
        let heartbeat = tokio::spawn(self.clone().heartbeat_loop(self.shutdown.subscribe()));
        let sync = tokio::spawn(self.clone().sync_loop(self.shutdown.subscribe()));
        self.tasks.lock().extend([server, heartbeat, sync]);

        tracing::info!(
            "Node {} listening on {} (cluster {})",
            self.local_id(),
            addr,
            self.config.cluster_id
        );
        Ok(addr)
    }

    /// Announces departure, stops the loops and closes the listener.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Stopping node {}", self.local_id());

        self.flush_pending().await;
        self.membership.set_local_status(NodeStatus::Offline);
        let notified = self
            .broadcast(&ClusterMessage::ClusterDeparture {
                node_id: self.local_id().to_string(),
            })
            .await;
        tracing::debug!("Departure announced to {} peer(s)", notified);

        self.shutdown.send_replace(true);
        tokio::time::sleep(SHUTDOWN_GRACE).await;

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                tracing::warn!("Background task still busy after shutdown grace, detaching");
            }
        }
    }

    /// Joins an existing cluster through one of its members, then pulls its atoms.
    pub async fn join_cluster(&self, seed_host: &str, seed_port: u16) -> bool {
        let seed = format!("{}:{}", seed_host, seed_port);
        let request = ClusterMessage::ClusterJoinRequest {
            cluster_id: self.config.cluster_id.clone(),
            node: self.membership.local_node(),
        };

        match self.transport.request(&seed, &request).await {
            Some(ClusterResponse::Accepted { cluster_id, nodes }) => {
                for node in nodes {
                    let node_id = node.id.clone();
                    if self.membership.record_heartbeat(node) {
                        self.events.emit(&ClusterEvent::NodeJoined { node_id });
                    }
                }
                tracing::info!(
                    "Joined cluster {} via {} ({} members)",
                    cluster_id,
                    seed,
                    self.membership.len()
                );

                self.broadcast(&ClusterMessage::Heartbeat {
                    node: self.membership.local_node(),
                })
                .await;

                let previous = self.membership.local_node().status;
                self.membership.set_local_status(NodeStatus::Synchronizing);
                let synced = self.initial_sync(&seed).await;
                self.membership.set_local_status(previous);
                tracing::info!("Initial sync pulled {} atom(s) from {}", synced, seed);
                true
            }
            Some(ClusterResponse::Rejected { reason }) => {
                tracing::warn!("Join via {} rejected: {}", seed, reason);
                false
            }
            Some(other) => {
                tracing::warn!("Join via {} got unexpected '{}' response", seed, other.status());
                false
            }
            None => false,
        }
    }

    /// Tries each configured seed in turn until one accepts.
    pub async fn join_seeds(&self) -> bool {
        for seed in &self.config.seed_nodes {
            let Some((host, port)) = seed.rsplit_once(':') else {
                tracing::warn!("Ignoring malformed seed address '{}'", seed);
                continue;
            };
            let Ok(port) = port.parse::<u16>() else {
                tracing::warn!("Ignoring seed '{}' with invalid port", seed);
                continue;
            };
            if self.join_cluster(host, port).await {
                return true;
            }
        }
        false
    }

    async fn initial_sync(&self, seed: &str) -> usize {
        let request = ClusterMessage::FetchAllAtoms {
            source_node: self.local_id().to_string(),
        };
        let Some(ClusterResponse::Atoms { atoms }) = self.transport.request(seed, &request).await
        else {
            tracing::warn!("Initial sync with {} returned no atoms", seed);
            return 0;
        };

        let mut added = 0;
        for payload in atoms {
            match ClusterTransport::decode_atom(&payload) {
                Ok(atom) if !self.space.contains(&atom.handle) => {
                    self.space.apply_add(atom, ChangeOrigin::Remote);
                    added += 1;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping undecodable atom from {}: {}", seed, e),
            }
        }
        added
    }

    // --- Background loops ---

    async fn server_loop(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let cluster = self.clone();
                        tokio::spawn(async move {
                            cluster.handle_connection(stream, peer).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
        tracing::info!("Listener for node {} closed", self.local_id());
    }

    async fn heartbeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let interval = self.heartbeat.lock().current_interval();
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if !self.is_running() {
                break;
            }
            self.run_heartbeat_cycle().await;
        }
    }

    async fn sync_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            if !self.is_running() {
                break;
            }
            self.flush_pending().await;
        }
    }

    /// One heartbeat round: evict silent peers, announce ourselves, and
    /// feed the adaptive controller.
    pub async fn run_heartbeat_cycle(&self) {
        self.refresh_local_stats();

        for node in self.membership.prune_stale(self.config.stale_threshold) {
            self.events.emit(&ClusterEvent::NodeLeft { node_id: node.id });
        }

        self.broadcast(&ClusterMessage::Heartbeat {
            node: self.membership.local_node(),
        })
        .await;

        let members = self.membership.len();
        let previous = self.last_member_count.swap(members, Ordering::SeqCst);
        let active = previous != members || !self.pending.lock().is_empty();
        {
            let mut heartbeat = self.heartbeat.lock();
            if active {
                heartbeat.record_activity();
            } else {
                heartbeat.record_stable_cycle();
            }
        }
    }

    /// Drains the pending queue and broadcasts each operation. Returns how
    /// many operations were drained.
    pub async fn flush_pending(&self) -> usize {
        let operations = std::mem::take(&mut *self.pending.lock());
        if operations.is_empty() {
            return 0;
        }
        let count = operations.len();
        if self.membership.peers().is_empty() {
            tracing::debug!("No peers, dropping {} sync operation(s)", count);
            return count;
        }

        for operation in operations {
            self.broadcast(&ClusterMessage::SyncOperation { operation })
                .await;
        }
        tracing::debug!("Flushed {} sync operation(s)", count);
        count
    }

    fn refresh_local_stats(&self) {
        let local_size = self.space.len() as u64;
        let peer_total: u64 = self
            .membership
            .peers()
            .iter()
            .map(|peer| peer.atomspace_size)
            .sum();
        let mean = (local_size + peer_total) as f64 / self.membership.len().max(1) as f64;
        self.membership.update_local(|local| {
            local.atomspace_size = local_size;
            local.load_factor = if mean > 0.0 {
                local_size as f64 / mean
            } else {
                0.0
            };
        });
    }

    // --- Local mutations ---

    /// Adds (or replaces) an atom locally; the change reaches peers on the next sync.
    pub fn add_atom(&self, atom: Atom) -> Handle {
        self.space.add(atom)
    }

    pub fn remove_atom(&self, handle: &Handle) -> bool {
        self.space.remove(handle).is_some()
    }

    pub fn set_truth_value(&self, handle: &Handle, tv: TruthValue) -> bool {
        self.space.set_truth_value(handle, tv)
    }

    fn on_local_change(&self, event: AtomEvent, atom: &Atom, origin: ChangeOrigin) {
        if origin == ChangeOrigin::Remote {
            return;
        }
        let operation_type = match event {
            AtomEvent::Added => SyncOperationType::Add,
            AtomEvent::TruthValueChanged => SyncOperationType::Update,
            AtomEvent::Removed => SyncOperationType::Remove,
        };
        let atom_data = match operation_type {
            SyncOperationType::Remove => None,
            _ => match self.transport.encode_atom(atom) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::error!("Cannot encode atom {} for sync: {}", atom.handle, e);
                    return;
                }
            },
        };
        let clock = self.causal.record_local(atom.handle);
        let operation =
            SyncOperation::new(self.local_id(), operation_type, atom.handle, atom_data, clock);
        self.pending.lock().push(operation);
    }

    // --- Inbound messages ---

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let message = match read_frame::<_, ClusterMessage>(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Malformed message from {}: {}", peer, e);
                return;
            }
        };

        let expects_response = message.expects_response();
        let kind = message.kind();
        let response = self.handle_message(message).await;
        if expects_response && let Err(e) = write_frame(&mut write_half, &response).await {
            tracing::warn!("Failed to answer {} from {}: {}", kind, peer, e);
        }
    }

    pub async fn handle_message(&self, message: ClusterMessage) -> ClusterResponse {
        match message {
            ClusterMessage::ClusterJoinRequest { cluster_id, node } => {
                self.handle_join(&cluster_id, node)
            }
            ClusterMessage::Heartbeat { node } => {
                self.handle_heartbeat(node);
                ClusterResponse::Success
            }
            ClusterMessage::SyncOperation { operation } => {
                self.apply_sync_operation(operation).await;
                ClusterResponse::Success
            }
            ClusterMessage::ClusterDeparture { node_id } => {
                self.handle_departure(&node_id);
                ClusterResponse::Success
            }
            ClusterMessage::ConflictResolution {
                source_node,
                atom_handle,
                atom_data,
                vector_clock,
            } => {
                self.apply_conflict_resolution(&source_node, atom_handle, &atom_data, &vector_clock);
                ClusterResponse::Success
            }
            other => self.dispatch_registered(other).await,
        }
    }

    fn handle_join(&self, cluster_id: &str, node: ClusterNodeInfo) -> ClusterResponse {
        if cluster_id != self.config.cluster_id {
            tracing::warn!(
                "Rejecting join from {}: cluster id '{}' != '{}'",
                node.id,
                cluster_id,
                self.config.cluster_id
            );
            return ClusterResponse::Rejected {
                reason: format!(
                    "cluster id mismatch: expected '{}', got '{}'",
                    self.config.cluster_id, cluster_id
                ),
            };
        }

        let node_id = node.id.clone();
        if self.membership.record_heartbeat(node) {
            self.events.emit(&ClusterEvent::NodeJoined { node_id });
        }
        ClusterResponse::Accepted {
            cluster_id: self.config.cluster_id.clone(),
            nodes: self.membership.members(),
        }
    }

    fn handle_heartbeat(&self, node: ClusterNodeInfo) {
        let node_id = node.id.clone();
        if self.membership.record_heartbeat(node) {
            self.events.emit(&ClusterEvent::NodeJoined { node_id });
        }
    }

    fn handle_departure(&self, node_id: &str) {
        if self.membership.remove(node_id).is_some() {
            tracing::info!("Node {} left the cluster", node_id);
            self.events.emit(&ClusterEvent::NodeLeft {
                node_id: node_id.to_string(),
            });
        }
    }

    async fn dispatch_registered(&self, message: ClusterMessage) -> ClusterResponse {
        let kind = message.kind();
        if !self.handlers.has_handler(kind) {
            return self.serve_from_atomspace(message);
        }
        self.handlers
            .dispatch(message)
            .await
            .unwrap_or_else(|| ClusterResponse::Failed {
                reason: format!("handler for {} disappeared", kind),
            })
    }

    /// Fallback for nodes without a storage layer: answer reads from the AtomSpace.
    fn serve_from_atomspace(&self, message: ClusterMessage) -> ClusterResponse {
        match message {
            ClusterMessage::FetchAtom { atom_handle } => match self.space.get(&atom_handle) {
                Some(atom) => match self.transport.encode_atom(&atom) {
                    Ok(atom_data) => ClusterResponse::Found { atom_data },
                    Err(e) => ClusterResponse::Failed {
                        reason: e.to_string(),
                    },
                },
                None => ClusterResponse::NotFound,
            },
            ClusterMessage::FetchAllAtoms { .. } => ClusterResponse::Atoms {
                atoms: self.encode_all(self.space.atoms()),
            },
            other => ClusterResponse::Rejected {
                reason: format!("no handler for {}", other.kind()),
            },
        }
    }

    pub fn encode_all(&self, atoms: impl IntoIterator<Item = Atom>) -> Vec<AtomPayload> {
        atoms
            .into_iter()
            .filter_map(|atom| match self.transport.encode_atom(&atom) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!("Skipping atom {}: {}", atom.handle, e);
                    None
                }
            })
            .collect()
    }

    // --- Sync & conflicts ---

    /// Classifies an inbound operation against this node's causal history.
    /// Stale and concurrent updates are both reported.
    pub fn detect_conflict(&self, operation: &SyncOperation) -> Option<ConflictInfo> {
        let clock = operation.vector_clock.clone().unwrap_or_default();
        match self
            .causal
            .detect_conflict(&operation.atom_handle, &operation.source_node, &clock)
        {
            ConflictCheck::Conflict(info) => Some(info),
            ConflictCheck::Apply | ConflictCheck::Duplicate => None,
        }
    }

    pub async fn apply_sync_operation(&self, operation: SyncOperation) {
        if operation.source_node == self.local_id() {
            return;
        }
        if let Some(target) = &operation.target_node
            && target != self.local_id()
        {
            return;
        }

        let handle = operation.atom_handle;
        let clock = operation.vector_clock.clone().unwrap_or_default();
        match self
            .causal
            .detect_conflict(&handle, &operation.source_node, &clock)
        {
            ConflictCheck::Duplicate => {
                tracing::debug!("Duplicate sync operation {} for {}", operation.id, handle);
            }
            ConflictCheck::Apply => {
                self.apply_operation(&operation);
                self.causal.observe(handle, &clock);
            }
            ConflictCheck::Conflict(info) if info.kind == ConflictKind::StaleUpdate => {
                tracing::debug!(
                    "Dropping stale {:?} for {} from {}",
                    operation.operation_type,
                    handle,
                    operation.source_node
                );
            }
            ConflictCheck::Conflict(info) => {
                self.causal.observe(handle, &clock);
                self.resolve_conflict(&operation, info).await;
            }
        }
    }

    fn apply_operation(&self, operation: &SyncOperation) {
        match operation.operation_type {
            SyncOperationType::Add | SyncOperationType::Update => {
                if let Some(atom) = decode_operation(operation) {
                    self.space.apply_add(atom, ChangeOrigin::Remote);
                }
            }
            SyncOperationType::Remove => {
                self.space
                    .apply_remove(&operation.atom_handle, ChangeOrigin::Remote);
            }
        }
    }

    async fn resolve_conflict(&self, operation: &SyncOperation, info: ConflictInfo) {
        let handle = operation.atom_handle;
        tracing::info!(
            "Concurrent modification of {} by {} ({:?} strategy)",
            handle,
            operation.source_node,
            self.resolver.strategy()
        );

        match operation.operation_type {
            // A concurrent removal wins outright.
            SyncOperationType::Remove => {
                self.space.apply_remove(&handle, ChangeOrigin::Remote);
            }
            SyncOperationType::Add | SyncOperationType::Update => {
                let Some(incoming) = decode_operation(operation) else {
                    return;
                };
                let local = self.space.get(&handle);
                match self.resolver.resolve(local.as_ref(), &incoming, &info) {
                    Some(resolved) => {
                        let differs = resolved != incoming;
                        self.space.apply_add(resolved.clone(), ChangeOrigin::Remote);
                        if differs {
                            self.broadcast_resolution(&resolved).await;
                        }
                    }
                    None => {
                        if let Some(local) = local {
                            self.broadcast_resolution(&local).await;
                        }
                    }
                }
            }
        }

        self.events.emit(&ClusterEvent::ConflictResolved {
            handle,
            kind: info.kind,
            source_node: info.source_node,
        });
    }

    async fn broadcast_resolution(&self, atom: &Atom) {
        let atom_data = match self.transport.encode_atom(atom) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Cannot encode resolved atom {}: {}", atom.handle, e);
                return;
            }
        };
        let vector_clock = self.causal.record_local(atom.handle);
        self.broadcast(&ClusterMessage::ConflictResolution {
            source_node: self.local_id().to_string(),
            atom_handle: atom.handle,
            atom_data,
            vector_clock,
        })
        .await;
    }

    fn apply_conflict_resolution(
        &self,
        source_node: &str,
        handle: Handle,
        payload: &AtomPayload,
        clock: &VectorClock,
    ) {
        match self.causal.detect_conflict(&handle, source_node, clock) {
            ConflictCheck::Duplicate => return,
            ConflictCheck::Conflict(info) if info.kind == ConflictKind::StaleUpdate => return,
            _ => {}
        }
        match ClusterTransport::decode_atom(payload) {
            Ok(atom) => {
                self.space.apply_add(atom, ChangeOrigin::Remote);
                self.causal.observe(handle, clock);
                tracing::debug!("Applied resolution of {} from {}", handle, source_node);
            }
            Err(e) => tracing::warn!("Bad resolution payload from {}: {}", source_node, e),
        }
    }

    // --- Messaging helpers ---

    /// Sends `message` to every peer concurrently; returns successful deliveries.
    pub async fn broadcast(&self, message: &ClusterMessage) -> usize {
        let peers = self.membership.peers();
        if peers.is_empty() {
            return 0;
        }

        let mut sends = JoinSet::new();
        for peer in peers {
            let transport = self.transport.clone();
            let message = message.clone();
            sends.spawn(async move { transport.send(&peer.addr(), &message).await });
        }

        let mut delivered = 0;
        while let Some(result) = sends.join_next().await {
            if matches!(result, Ok(true)) {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn request_from(
        &self,
        node_id: &str,
        message: &ClusterMessage,
    ) -> Option<ClusterResponse> {
        let Some(node) = self.membership.get_member(node_id) else {
            tracing::warn!("{}", ClusterError::UnknownNode(node_id.to_string()));
            return None;
        };
        self.transport.request(&node.addr(), message).await
    }

    // --- Extension points & accessors ---

    pub fn register_handler<F, Fut>(&self, kind: &str, handler: F)
    where
        F: Fn(ClusterMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ClusterResponse> + Send + 'static,
    {
        self.handlers.register(kind, handler);
    }

    pub fn on_event<F>(&self, handler: F) -> u64
    where
        F: Fn(&ClusterEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    /// Drops a handler added with `on_event`.
    pub fn off_event(&self, id: u64) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn emit_event(&self, event: ClusterEvent) {
        self.events.emit(&event);
    }

    pub fn local_id(&self) -> &str {
        self.membership.local_id()
    }

    pub fn local_addr(&self) -> String {
        self.membership.local_node().addr()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn membership(&self) -> &ClusterMembership {
        &self.membership
    }

    pub fn atomspace(&self) -> &Arc<AtomSpace> {
        &self.space
    }

    pub fn transport(&self) -> &ClusterTransport {
        &self.transport
    }

    pub fn vector_clock(&self) -> VectorClock {
        self.causal.snapshot()
    }

    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        self.heartbeat.lock().stats()
    }

    pub fn pending_operations(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for DistributedCluster {
    fn drop(&mut self) {
        self.space.unsubscribe(self.subscription);
    }
}

fn decode_operation(operation: &SyncOperation) -> Option<Atom> {
    let Some(payload) = &operation.atom_data else {
        tracing::warn!(
            "{:?} for {} from {} carries no atom",
            operation.operation_type,
            operation.atom_handle,
            operation.source_node
        );
        return None;
    };
    match ClusterTransport::decode_atom(payload) {
        Ok(atom) => Some(atom),
        Err(e) => {
            tracing::error!("Undecodable atom in operation {}: {}", operation.id, e);
            None
        }
    }
}
