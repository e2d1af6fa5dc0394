//! Dependency Sets
//!
//! A `Dep` is the set of effect nodes subscribed to one (target, key) pair.
//! Membership is mirrored on the node side: a node lists every `Dep` it
//! belongs to, and both sides are always updated together.
//!
//! Besides the subscriber set, each `Dep` carries two bitmasks used while a
//! node runs. Bit `n` corresponds to effect nesting depth `n`:
//!
//! - `was_tracked`: set for every dependency the node had before the run.
//! - `newly_tracked`: set the first time the dependency is read during the run.
//!
//! After the run, a dependency with the first bit and without the second is
//! stale and the node leaves it. This avoids rebuilding the whole set on every
//! run.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::{EffectId, EffectNode};

/// A set of subscribed effect nodes.
///
/// Subscribers are held weakly: a node stays alive through its own handles,
/// not through the data it observes.
pub struct Dep {
    state: Mutex<DepState>,
}

struct DepState {
    subscribers: IndexMap<EffectId, Weak<dyn EffectNode>>,
    was_tracked: u32,
    newly_tracked: u32,
}

impl Dep {
    /// Create a new empty dependency set.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DepState {
                subscribers: IndexMap::new(),
                was_tracked: 0,
                newly_tracked: 0,
            }),
        })
    }

    /// Number of subscribed nodes.
    pub fn len(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Whether no node is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether the node with the given id is subscribed.
    pub fn contains(&self, id: EffectId) -> bool {
        self.state.lock().subscribers.contains_key(&id)
    }

    /// Ids of subscribed nodes in subscription order.
    pub fn subscriber_ids(&self) -> Vec<EffectId> {
        self.state.lock().subscribers.keys().copied().collect()
    }

    pub(crate) fn insert(&self, node: &Arc<dyn EffectNode>) {
        self.state
            .lock()
            .subscribers
            .insert(node.core().id(), Arc::downgrade(node));
    }

    pub(crate) fn remove(&self, id: EffectId) {
        self.state.lock().subscribers.shift_remove(&id);
    }

    /// Live subscribers, in subscription order.
    ///
    /// The returned handles are collected before the lock is released so
    /// that dropping them can never re-enter this set while it is locked.
    pub(crate) fn subscribers(&self) -> Vec<Arc<dyn EffectNode>> {
        let mut state = self.state.lock();
        state.subscribers.retain(|_, weak| weak.strong_count() > 0);
        state
            .subscribers
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub(crate) fn was_tracked(&self, bit: u32) -> bool {
        self.state.lock().was_tracked & bit != 0
    }

    pub(crate) fn newly_tracked(&self, bit: u32) -> bool {
        self.state.lock().newly_tracked & bit != 0
    }

    pub(crate) fn mark_was_tracked(&self, bit: u32) {
        self.state.lock().was_tracked |= bit;
    }

    pub(crate) fn mark_newly_tracked(&self, bit: u32) {
        self.state.lock().newly_tracked |= bit;
    }

    pub(crate) fn clear_markers(&self, bit: u32) {
        let mut state = self.state.lock();
        state.was_tracked &= !bit;
        state.newly_tracked &= !bit;
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Dep")
            .field("subscribers", &state.subscribers.keys().collect::<Vec<_>>())
            .field("was_tracked", &format_args!("{:#b}", state.was_tracked))
            .field("newly_tracked", &format_args!("{:#b}", state.newly_tracked))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_per_bit() {
        let dep = Dep::new();

        dep.mark_was_tracked(1 << 1);
        dep.mark_newly_tracked(1 << 2);

        assert!(dep.was_tracked(1 << 1));
        assert!(!dep.was_tracked(1 << 2));
        assert!(dep.newly_tracked(1 << 2));
        assert!(!dep.newly_tracked(1 << 1));

        dep.clear_markers(1 << 1);
        assert!(!dep.was_tracked(1 << 1));
        assert!(dep.newly_tracked(1 << 2));
    }

    #[test]
    fn new_dep_is_empty() {
        let dep = Dep::new();
        assert!(dep.is_empty());
        assert!(dep.subscriber_ids().is_empty());
    }
}
