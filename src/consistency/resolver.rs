use serde::{Deserialize, Serialize};

use super::vector_clock::{CausalOrdering, ConflictInfo};
use crate::atom::{Atom, TruthValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolutionStrategy {
    /// The incoming atom replaces the local one.
    ///
    /// Each side applies the other's version, so two writers racing on the
    /// same atom end up holding each other's value until the next write.
    /// Choose `VectorClock` when replicas must agree after a race.
    #[default]
    LastWriteWins,
    /// Confidence-weighted blend of both truth values.
    MergeUsingTruthValues,
    /// The causally later version wins; concurrent versions are ordered by
    /// event count and then by node id.
    VectorClock,
    /// Needs a multi-node voting round that does not exist; behaves as `LastWriteWins`.
    ConsensusVoting,
}

pub struct ConflictResolver {
    strategy: ConflictResolutionStrategy,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictResolutionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ConflictResolutionStrategy {
        self.strategy
    }

    /// Picks the version to keep. `None` means the local state (which may be
    /// "absent") stays as it is.
    pub fn resolve(
        &self,
        local: Option<&Atom>,
        incoming: &Atom,
        conflict: &ConflictInfo,
    ) -> Option<Atom> {
        match self.strategy {
            ConflictResolutionStrategy::LastWriteWins => Some(incoming.clone()),
            ConflictResolutionStrategy::ConsensusVoting => {
                tracing::debug!(
                    "Consensus voting unavailable for {}, falling back to last-write-wins",
                    conflict.handle
                );
                Some(incoming.clone())
            }
            ConflictResolutionStrategy::MergeUsingTruthValues => {
                let Some(local) = local else {
                    return Some(incoming.clone());
                };
                let mut merged = incoming.clone();
                merged.tv = merge_truth_values(local.tv, incoming.tv, self.strategy);
                Some(merged)
            }
            ConflictResolutionStrategy::VectorClock => {
                if remote_takes_precedence(conflict) {
                    Some(incoming.clone())
                } else {
                    None
                }
            }
        }
    }
}

fn remote_takes_precedence(conflict: &ConflictInfo) -> bool {
    match conflict.remote_clock.compare(&conflict.local_clock) {
        CausalOrdering::Greater => true,
        CausalOrdering::Less => false,
        CausalOrdering::Equal | CausalOrdering::Concurrent => {
            let remote_events = conflict.remote_clock.total();
            let local_events = conflict.local_clock.total();
            if remote_events != local_events {
                remote_events > local_events
            } else {
                conflict.source_node > conflict.local_node
            }
        }
    }
}

/// Combines two truth values under a policy. Deterministic and, for the
/// merging policies, symmetric in its arguments.
///
/// - `LastWriteWins` / `ConsensusVoting`: `incoming`.
/// - `MergeUsingTruthValues`: strength is the confidence-weighted mean, confidence is the max.
/// - `VectorClock`: without clocks to compare, the more confident value wins (`incoming` on ties).
pub fn merge_truth_values(
    local: TruthValue,
    incoming: TruthValue,
    strategy: ConflictResolutionStrategy,
) -> TruthValue {
    match strategy {
        ConflictResolutionStrategy::LastWriteWins | ConflictResolutionStrategy::ConsensusVoting => {
            incoming
        }
        ConflictResolutionStrategy::MergeUsingTruthValues => {
            let weight = local.confidence + incoming.confidence;
            let strength = if weight > 0.0 {
                (local.strength * local.confidence + incoming.strength * incoming.confidence)
                    / weight
            } else {
                (local.strength + incoming.strength) / 2.0
            };
            TruthValue::new(strength, local.confidence.max(incoming.confidence))
        }
        ConflictResolutionStrategy::VectorClock => {
            if local.confidence > incoming.confidence {
                local
            } else {
                incoming
            }
        }
    }
}
