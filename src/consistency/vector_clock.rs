use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::atom::Handle;

/// Per-node logical clock. Entries never decrease.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct VectorClock {
    clocks: BTreeMap<String, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> u64 {
        self.clocks.get(node_id).copied().unwrap_or(0)
    }

    /// Bumps only `node_id`'s entry and returns a snapshot of the result.
    pub fn increment(&mut self, node_id: &str) -> VectorClock {
        *self.clocks.entry(node_id.to_string()).or_insert(0) += 1;
        self.clone()
    }

    /// Per-entry maximum.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, &clock) in &other.clocks {
            let entry = self.clocks.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(clock);
        }
    }

    pub fn compare(&self, other: &VectorClock) -> CausalOrdering {
        let mut less = false;
        let mut greater = false;
        let nodes: BTreeSet<&String> = self.clocks.keys().chain(other.clocks.keys()).collect();

        for node in nodes {
            let left = self.get(node);
            let right = other.get(node);
            if left < right {
                less = true;
            } else if left > right {
                greater = true;
            }
        }

        match (less, greater) {
            (false, false) => CausalOrdering::Equal,
            (true, false) => CausalOrdering::Less,
            (false, true) => CausalOrdering::Greater,
            (true, true) => CausalOrdering::Concurrent,
        }
    }

    /// Sum of all entries, i.e. the number of events this clock has seen.
    pub fn total(&self) -> u64 {
        self.clocks.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.clocks.iter().map(|(node, &clock)| (node.as_str(), clock))
    }
}

/// Relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrdering {
    Less,
    Equal,
    Greater,
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Neither side has seen the other's latest edit.
    ConcurrentModification,
    /// The incoming edit is causally behind what was already applied.
    StaleUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub handle: Handle,
    pub kind: ConflictKind,
    pub local_node: String,
    pub source_node: String,
    pub local_clock: VectorClock,
    pub remote_clock: VectorClock,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictCheck {
    Apply,
    Duplicate,
    Conflict(ConflictInfo),
}

/// Node clock plus the last clock applied per atom.
pub struct CausalTracker {
    node_id: String,
    clock: Mutex<VectorClock>,
    atom_clocks: DashMap<Handle, VectorClock>,
}

impl CausalTracker {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            clock: Mutex::new(VectorClock::new()),
            atom_clocks: DashMap::new(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Records a local mutation of `handle` and returns the clock to ship with it.
    pub fn record_local(&self, handle: Handle) -> VectorClock {
        let snapshot = self.clock.lock().increment(&self.node_id);
        self.atom_clocks.insert(handle, snapshot.clone());
        snapshot
    }

    pub fn detect_conflict(
        &self,
        handle: &Handle,
        source_node: &str,
        remote_clock: &VectorClock,
    ) -> ConflictCheck {
        let Some(local_clock) = self.atom_clocks.get(handle).map(|c| c.value().clone()) else {
            return ConflictCheck::Apply;
        };

        let kind = match remote_clock.compare(&local_clock) {
            CausalOrdering::Greater => return ConflictCheck::Apply,
            CausalOrdering::Equal => return ConflictCheck::Duplicate,
            CausalOrdering::Less => ConflictKind::StaleUpdate,
            CausalOrdering::Concurrent => ConflictKind::ConcurrentModification,
        };

        ConflictCheck::Conflict(ConflictInfo {
            handle: *handle,
            kind,
            local_node: self.node_id.clone(),
            source_node: source_node.to_string(),
            local_clock,
            remote_clock: remote_clock.clone(),
        })
    }

    /// Folds a remote clock into both the node clock and the atom's history.
    pub fn observe(&self, handle: Handle, remote_clock: &VectorClock) {
        self.clock.lock().merge(remote_clock);
        self.atom_clocks
            .entry(handle)
            .or_default()
            .merge(remote_clock);
    }

    pub fn snapshot(&self) -> VectorClock {
        self.clock.lock().clone()
    }

    pub fn atom_clock(&self, handle: &Handle) -> Option<VectorClock> {
        self.atom_clocks.get(handle).map(|c| c.value().clone())
    }
}
