use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub Uuid);

impl Handle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Handle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Probabilistic truth value. Both components are kept within `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TruthValue {
    pub strength: f64,
    pub confidence: f64,
}

impl TruthValue {
    pub fn new(strength: f64, confidence: f64) -> Self {
        Self {
            strength: clamp_unit(strength),
            confidence: clamp_unit(confidence),
        }
    }
}

impl Default for TruthValue {
    fn default() -> Self {
        Self {
            strength: 1.0,
            confidence: 0.0,
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AtomKind {
    Node { name: String },
    Link { outgoing: Vec<Handle> },
}

/// A node or link in the hypergraph.
///
/// Identity is the handle: a truth-value update produces a new version of the
/// same atom rather than a new atom.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Atom {
    pub handle: Handle,
    pub atom_type: String,
    pub tv: TruthValue,
    pub kind: AtomKind,
}

impl Atom {
    pub fn node(atom_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            handle: Handle::new(),
            atom_type: atom_type.into(),
            tv: TruthValue::default(),
            kind: AtomKind::Node { name: name.into() },
        }
    }

    pub fn link(atom_type: impl Into<String>, outgoing: Vec<Handle>) -> Self {
        Self {
            handle: Handle::new(),
            atom_type: atom_type.into(),
            tv: TruthValue::default(),
            kind: AtomKind::Link { outgoing },
        }
    }

    pub fn with_truth_value(mut self, tv: TruthValue) -> Self {
        self.tv = tv;
        self
    }

    pub fn is_node(&self) -> bool {
        matches!(self.kind, AtomKind::Node { .. })
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, AtomKind::Link { .. })
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            AtomKind::Node { name } => Some(name),
            AtomKind::Link { .. } => None,
        }
    }

    /// Outgoing set of a link; empty for nodes.
    pub fn outgoing(&self) -> &[Handle] {
        match &self.kind {
            AtomKind::Node { .. } => &[],
            AtomKind::Link { outgoing } => outgoing,
        }
    }
}
