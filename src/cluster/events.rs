use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::atom::Handle;
use crate::consistency::ConflictKind;

/// Notifications about cluster-level changes.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClusterEvent {
    NodeJoined {
        node_id: String,
    },
    /// Emitted once per departure, whether announced or detected by staleness.
    NodeLeft {
        node_id: String,
    },
    PartitionRebalanced {
        moved: usize,
    },
    ConflictResolved {
        handle: Handle,
        kind: ConflictKind,
        source_node: String,
    },
}

pub type EventHandler = Arc<dyn Fn(&ClusterEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: DashMap<u64, EventHandler>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn subscribe<F>(&self, handler: F) -> u64
    where
        F: Fn(&ClusterEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.insert(id, Arc::new(handler));
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn emit(&self, event: &ClusterEvent) {
        tracing::debug!("Cluster event: {:?}", event);
        let handlers: Vec<EventHandler> = self
            .handlers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
