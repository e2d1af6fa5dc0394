//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: plain
//! effects, the node inside a computed value, or a render job installed by a
//! collaborator. Dependency sets only ever see them through [`EffectNode`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::graph::{Key, TrackOpType, TriggerOpType};
use crate::value::{TargetId, Value};

use super::effect::EffectCore;

/// Unique identifier for an effect node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of an effect node, as stored in dependency sets and in
/// the tracking context.
pub(crate) trait EffectNode: Send + Sync {
    /// Shared bookkeeping state of the node.
    fn core(&self) -> &EffectCore;

    /// Run the node, discarding its result. Used when a trigger reaches a
    /// node that has no scheduler.
    fn rerun(self: Arc<Self>);
}

/// The operation a debugger event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugOp {
    Track(TrackOpType),
    Trigger(TriggerOpType),
}

/// Event delivered to `on_track` / `on_trigger` hooks.
#[derive(Debug, Clone)]
pub struct DebuggerEvent {
    /// The node being tracked or triggered.
    pub effect: EffectId,
    /// The target involved, if the edge belongs to a target (cells have none).
    pub target: Option<TargetId>,
    pub op: DebugOp,
    pub key: Option<Key>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_ids_are_unique() {
        let id1 = EffectId::new();
        let id2 = EffectId::new();
        let id3 = EffectId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }
}
