//! In-process atom arena with change notification.
//!
//! Observers are owned by the `AtomSpace` instance. Every mutation is tagged
//! with a `ChangeOrigin` so that observers can tell a local edit apart from a
//! change applied on behalf of a peer.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{Atom, Handle, TruthValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomEvent {
    Added,
    Removed,
    TruthValueChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Caller on this node.
    Local,
    /// Applied from a peer's sync operation.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type ChangeHandler = Arc<dyn Fn(AtomEvent, &Atom, ChangeOrigin) + Send + Sync>;

pub struct AtomSpace {
    atoms: DashMap<Handle, Atom>,
    observers: DashMap<u64, ChangeHandler>,
    next_subscription: AtomicU64,
}

impl AtomSpace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a change handler. It runs synchronously on the mutating thread.
    pub fn on_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(AtomEvent, &Atom, ChangeOrigin) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, Arc::new(handler));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.remove(&id.0).is_some()
    }

    pub fn add(&self, atom: Atom) -> Handle {
        let handle = atom.handle;
        self.apply_add(atom, ChangeOrigin::Local);
        handle
    }

    /// Inserts or replaces an atom and returns the event it produced.
    ///
    /// Re-adding an atom with an unchanged truth value is a no-op.
    pub fn apply_add(&self, atom: Atom, origin: ChangeOrigin) -> Option<AtomEvent> {
        for target in atom.outgoing() {
            if !self.atoms.contains_key(target) {
                tracing::debug!(
                    "Link {} references {} which is not loaded yet",
                    atom.handle,
                    target
                );
            }
        }

        let event = match self.atoms.insert(atom.handle, atom.clone()) {
            None => AtomEvent::Added,
            Some(previous) if previous.tv != atom.tv => AtomEvent::TruthValueChanged,
            Some(_) => return None,
        };
        self.notify(event, &atom, origin);
        Some(event)
    }

    pub fn set_truth_value(&self, handle: &Handle, tv: TruthValue) -> bool {
        self.apply_truth_value(handle, tv, ChangeOrigin::Local)
    }

    pub fn apply_truth_value(&self, handle: &Handle, tv: TruthValue, origin: ChangeOrigin) -> bool {
        let updated = match self.atoms.get_mut(handle) {
            Some(mut entry) => {
                if entry.tv == tv {
                    return true;
                }
                entry.tv = tv;
                entry.value().clone()
            }
            None => return false,
        };
        self.notify(AtomEvent::TruthValueChanged, &updated, origin);
        true
    }

    pub fn remove(&self, handle: &Handle) -> Option<Atom> {
        self.apply_remove(handle, ChangeOrigin::Local)
    }

    pub fn apply_remove(&self, handle: &Handle, origin: ChangeOrigin) -> Option<Atom> {
        let (_, atom) = self.atoms.remove(handle)?;
        self.notify(AtomEvent::Removed, &atom, origin);
        Some(atom)
    }

    pub fn get(&self, handle: &Handle) -> Option<Atom> {
        self.atoms.get(handle).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.atoms.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> Vec<Atom> {
        self.atoms.iter().map(|entry| entry.value().clone()).collect()
    }

    fn notify(&self, event: AtomEvent, atom: &Atom, origin: ChangeOrigin) {
        // Handlers are cloned out first so none of them runs under a map shard lock.
        let handlers: Vec<ChangeHandler> = self
            .observers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for handler in handlers {
            handler(event, atom, origin);
        }
    }
}

impl Default for AtomSpace {
    fn default() -> Self {
        Self {
            atoms: DashMap::new(),
            observers: DashMap::new(),
            next_subscription: AtomicU64::new(1),
        }
    }
}
