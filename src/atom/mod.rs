//! Hypergraph Data Model
//!
//! Atoms are the unit of knowledge stored and replicated by the cluster.
//!
//! ## Core Concepts
//! - **Handle**: a UUID assigned once when an atom is created and never reused.
//! - **Atom**: a typed `Node` (named) or `Link` (ordered outgoing handles) carrying a `TruthValue`.
//! - **AtomSpace**: the in-process arena of atoms, keyed by handle. Links hold handles rather
//!   than references, so cyclic structures need no special treatment.
//! - **LocalStore**: the durable single-node backend consumed by the storage layer.

pub mod space;
pub mod store;
pub mod types;

pub use space::{AtomEvent, AtomSpace, ChangeOrigin, SubscriptionId};
pub use store::{LocalStore, MemoryStore};
pub use types::{Atom, AtomKind, Handle, TruthValue};
