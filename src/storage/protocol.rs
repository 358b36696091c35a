//! HTTP Status Surface
//!
//! Request/response bodies for the node binary's local HTTP endpoints. These
//! are a convenience for operators and scripts; nodes talk to each other over
//! the cluster transport, never over HTTP.

use serde::{Deserialize, Serialize};

use crate::atom::{Atom, Handle, TruthValue};

// --- API Endpoints ---

pub const ENDPOINT_STATS: &str = "/stats";
/// Create an atom and store it through the partitioned layer.
pub const ENDPOINT_ATOMS: &str = "/atoms";
/// Fetch a single atom by handle, locally or from peers.
pub const ENDPOINT_ATOM: &str = "/atoms/:handle";

// --- Data Transfer Objects ---

/// Body of `POST /atoms`. Exactly one of `name` (node) or `outgoing` (link) must be set.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreAtomRequest {
    pub atom_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub outgoing: Option<Vec<Handle>>,
    #[serde(default)]
    pub tv: Option<TruthValue>,
}

impl StoreAtomRequest {
    pub fn into_atom(self) -> Option<Atom> {
        let atom = match (self.name, self.outgoing) {
            (Some(name), None) => Atom::node(self.atom_type, name),
            (None, Some(outgoing)) => Atom::link(self.atom_type, outgoing),
            _ => return None,
        };
        Some(match self.tv {
            Some(tv) => atom.with_truth_value(TruthValue::new(tv.strength, tv.confidence)),
            None => atom,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreAtomResponse {
    pub success: bool,
    pub handle: Option<Handle>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchAtomResponse {
    /// `None` when no node holds the atom.
    pub atom: Option<Atom>,
}
