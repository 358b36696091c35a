use dashmap::DashMap;

use super::types::{Atom, Handle};

/// Durable single-node atom storage consumed by the distributed layer.
pub trait LocalStore: Send + Sync {
    fn get(&self, handle: &Handle) -> Option<Atom>;

    /// Inserts or replaces the atom. Returns `false` if it could not be persisted.
    fn put(&self, atom: &Atom) -> bool;

    /// Returns `true` if an atom was removed.
    fn delete(&self, handle: &Handle) -> bool;

    fn scan(&self) -> Box<dyn Iterator<Item = Atom> + '_>;

    fn len(&self) -> usize {
        self.scan().count()
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.get(handle).is_some()
    }
}

/// Concurrent in-memory `LocalStore`.
#[derive(Default)]
pub struct MemoryStore {
    atoms: DashMap<Handle, Atom>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, handle: &Handle) -> Option<Atom> {
        self.atoms.get(handle).map(|entry| entry.value().clone())
    }

    fn put(&self, atom: &Atom) -> bool {
        self.atoms.insert(atom.handle, atom.clone());
        true
    }

    fn delete(&self, handle: &Handle) -> bool {
        self.atoms.remove(handle).is_some()
    }

    fn scan(&self) -> Box<dyn Iterator<Item = Atom> + '_> {
        Box::new(self.atoms.iter().map(|entry| entry.value().clone()))
    }

    fn len(&self) -> usize {
        self.atoms.len()
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.atoms.contains_key(handle)
    }
}
