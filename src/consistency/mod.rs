//! Causality & Conflict Resolution
//!
//! Every node stamps its outgoing sync operations with a vector clock. A receiver compares the
//! incoming clock with the last clock it applied for the same atom:
//!
//! - **Dominating** clocks are applied directly.
//! - **Equal** clocks are duplicates and are skipped.
//! - **Older or concurrent** clocks raise a `ConflictInfo`, which the configured
//!   `ConflictResolver` turns into the atom version to keep.
//!
//! Resolution is best-effort and local; there is no cross-node agreement round.

pub mod resolver;
pub mod vector_clock;

pub use resolver::{ConflictResolutionStrategy, ConflictResolver, merge_truth_values};
pub use vector_clock::{
    CausalOrdering, CausalTracker, ConflictCheck, ConflictInfo, ConflictKind, VectorClock,
};
