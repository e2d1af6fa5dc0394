//! Reactive Runtime
//!
//! The runtime owns the dependency graph and connects reads to writes.
//!
//! # How It Works
//!
//! 1. When a wrapped target is read inside a running effect, [`track`]
//!    finds (or creates) the `Dep` for that (target, key) pair and
//!    subscribes the active effect to it.
//!
//! 2. When a wrapped target is written, [`trigger`] resolves every `Dep`
//!    the mutation can invalidate, merges their subscribers, and notifies
//!    each one: computed values first, then plain effects.
//!
//! 3. A notified node either re-runs or calls its scheduler.
//!
//! # Lifetime
//!
//! Entries are keyed by target identity. A target's entry is discarded when
//! the target itself is dropped; the graph never keeps a target alive.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::graph::{Dep, Key, TrackOpType, TriggerOpType};
use crate::value::{Target, TargetId, TargetKind, Value};

use super::context;
use super::subscriber::{DebugOp, DebuggerEvent, EffectId, EffectNode};

type KeyToDep = IndexMap<Key, Arc<Dep>>;

// Global table of observed targets.
static TARGET_MAP: OnceLock<Mutex<IndexMap<TargetId, KeyToDep>>> = OnceLock::new();

fn get_target_map() -> &'static Mutex<IndexMap<TargetId, KeyToDep>> {
    TARGET_MAP.get_or_init(|| Mutex::new(IndexMap::new()))
}

/// Read access to the dependency graph, mostly for inspection and for
/// collaborators that manage their own targets.
pub struct TargetMap;

impl TargetMap {
    /// The dependency set for `key` on `target`, if anything tracked it.
    pub fn dep(target: &Target, key: &Key) -> Option<Arc<Dep>> {
        get_target_map()
            .lock()
            .get(&target.id())
            .and_then(|deps| deps.get(key))
            .cloned()
    }

    /// Keys of `target` that have a dependency set.
    pub fn tracked_keys(target: &Target) -> Vec<Key> {
        get_target_map()
            .lock()
            .get(&target.id())
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the graph holds an entry for the target with this id.
    pub fn contains(id: TargetId) -> bool {
        get_target_map().lock().contains_key(&id)
    }

    fn dep_or_insert(id: TargetId, key: Key) -> Arc<Dep> {
        get_target_map()
            .lock()
            .entry(id)
            .or_default()
            .entry(key)
            .or_insert_with(Dep::new)
            .clone()
    }

    /// Discard the entry of a target that is being dropped.
    pub(crate) fn forget(id: TargetId) {
        let Some(map) = TARGET_MAP.get() else {
            return;
        };
        let removed = map.lock().swap_remove(&id);
        drop(removed);
    }
}

/// Record that the active effect read `key` on `target`.
///
/// No-op when tracking is paused or no effect is running.
pub fn track(target: &Target, op: TrackOpType, key: Key) {
    if !context::should_track() {
        return;
    }
    let Some(active) = context::active_effect() else {
        return;
    };

    let dep = TargetMap::dep_or_insert(target.id(), key.clone());
    track_node(&dep, &active, |effect| DebuggerEvent {
        effect,
        target: Some(target.id()),
        op: DebugOp::Track(op),
        key: Some(key),
        new_value: None,
        old_value: None,
    });
}

/// Subscribe the active effect to a dependency set owned by a cell.
pub fn track_effects(dep: &Arc<Dep>) {
    if !context::should_track() {
        return;
    }
    let Some(active) = context::active_effect() else {
        return;
    };

    track_node(dep, &active, |effect| DebuggerEvent {
        effect,
        target: None,
        op: DebugOp::Track(TrackOpType::Get),
        key: None,
        new_value: None,
        old_value: None,
    });
}

fn track_node(
    dep: &Arc<Dep>,
    active: &Arc<dyn EffectNode>,
    event: impl FnOnce(EffectId) -> DebuggerEvent,
) {
    let core = active.core();
    let (depth, limit) = context::depth();

    let should_add = if depth <= limit {
        let bit = context::op_bit(depth);
        if dep.newly_tracked(bit) {
            false
        } else {
            dep.mark_newly_tracked(bit);
            !dep.was_tracked(bit)
        }
    } else {
        !dep.contains(core.id())
    };

    if should_add {
        dep.insert(active);
        core.push_dep(Arc::clone(dep));
        trace!(effect = ?core.id(), depth, "dependency tracked");

        if let Some(on_track) = core.on_track() {
            on_track(&event(core.id()));
        }
    }
}

/// Details of one mutation, shared by every node it reaches.
struct TriggerInfo {
    target: Option<TargetId>,
    op: TriggerOpType,
    key: Option<Key>,
    new_value: Option<Value>,
    old_value: Option<Value>,
}

impl TriggerInfo {
    fn event(&self, effect: EffectId) -> DebuggerEvent {
        DebuggerEvent {
            effect,
            target: self.target,
            op: DebugOp::Trigger(self.op),
            key: self.key.clone(),
            new_value: self.new_value.clone(),
            old_value: self.old_value.clone(),
        }
    }
}

/// Notify every effect that depends on what this mutation changed.
///
/// `new_value` is required for sequence length writes: it selects which
/// index dependencies fell out of range.
pub fn trigger(
    target: &Target,
    op: TriggerOpType,
    key: Option<Key>,
    new_value: Option<Value>,
    old_value: Option<Value>,
) {
    let kind = target.kind();
    let deps = {
        let map = get_target_map().lock();
        let Some(key_to_dep) = map.get(&target.id()) else {
            // never tracked
            return;
        };
        collect_deps(key_to_dep, kind, op, key.as_ref(), new_value.as_ref())
    };

    let nodes = merge_subscribers(&deps);
    trace!(target_id = ?target.id(), ?op, key = ?key, nodes = nodes.len(), "trigger");

    let info = TriggerInfo {
        target: Some(target.id()),
        op,
        key,
        new_value,
        old_value,
    };
    dispatch(&nodes, &info);
}

/// Notify the subscribers of a dependency set owned by a cell.
pub fn trigger_effects(dep: &Dep) {
    let nodes = dep.subscribers();
    let info = TriggerInfo {
        target: None,
        op: TriggerOpType::Set,
        key: None,
        new_value: None,
        old_value: None,
    };
    dispatch(&nodes, &info);
}

fn collect_deps(
    key_to_dep: &KeyToDep,
    kind: TargetKind,
    op: TriggerOpType,
    key: Option<&Key>,
    new_value: Option<&Value>,
) -> Vec<Arc<Dep>> {
    let is_sequence = kind == TargetKind::Sequence;
    let is_collection = kind == TargetKind::Collection;
    let mut deps = Vec::new();

    if op == TriggerOpType::Clear {
        deps.extend(key_to_dep.values().cloned());
    } else if is_sequence && key.is_some_and(Key::is_length) {
        let new_len = new_value.and_then(Value::as_number).unwrap_or(0.0);
        for (dep_key, dep) in key_to_dep {
            let invalidated = match dep_key {
                Key::Index(index) => *index as f64 >= new_len,
                other => other.is_length(),
            };
            if invalidated {
                deps.push(Arc::clone(dep));
            }
        }
    } else {
        let mut push = |dep_key: &Key| deps.extend(key_to_dep.get(dep_key).cloned());

        if let Some(key) = key {
            push(key);
        }

        match op {
            TriggerOpType::Add => {
                if !is_sequence {
                    push(&Key::Iterate);
                    if is_collection {
                        push(&Key::MapKeyIterate);
                    }
                } else if key.is_some_and(Key::is_index) {
                    // new index added to a sequence -> length changes
                    push(&Key::length());
                }
            }
            TriggerOpType::Delete => {
                if !is_sequence {
                    push(&Key::Iterate);
                    if is_collection {
                        push(&Key::MapKeyIterate);
                    }
                }
            }
            TriggerOpType::Set => {
                if is_collection {
                    push(&Key::Iterate);
                }
            }
            TriggerOpType::Clear => {}
        }
    }

    deps
}

/// Union of the live subscribers of several sets, in first-seen order.
fn merge_subscribers(deps: &[Arc<Dep>]) -> Vec<Arc<dyn EffectNode>> {
    let mut nodes: IndexMap<EffectId, Arc<dyn EffectNode>> = IndexMap::new();
    for dep in deps {
        for node in dep.subscribers() {
            nodes.entry(node.core().id()).or_insert(node);
        }
    }
    nodes.into_values().collect()
}

/// Computed values are invalidated before any plain effect re-runs, so an
/// effect reading a computed value never sees a stale cache.
fn dispatch(nodes: &[Arc<dyn EffectNode>], info: &TriggerInfo) {
    for node in nodes.iter().filter(|node| node.core().is_computed()) {
        trigger_node(node, info);
    }
    for node in nodes.iter().filter(|node| !node.core().is_computed()) {
        trigger_node(node, info);
    }
}

fn trigger_node(node: &Arc<dyn EffectNode>, info: &TriggerInfo) {
    let core = node.core();
    if !core.is_active() {
        return;
    }
    if context::is_active(core.id()) && !core.allow_recurse() {
        return;
    }

    if let Some(on_trigger) = core.on_trigger() {
        on_trigger(&info.event(core.id()));
    }

    match core.scheduler() {
        Some(scheduler) => scheduler(),
        None => Arc::clone(node).rerun(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, ReactiveEffect};
    use crate::value::Target;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracking_effect(target: &Target, keys: Vec<Key>, runs: &Arc<AtomicUsize>) -> ReactiveEffect {
        let target = target.clone();
        let runs = runs.clone();
        let effect = ReactiveEffect::new(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            for key in &keys {
                track(&target, TrackOpType::Get, key.clone());
            }
        });
        effect.run();
        effect
    }

    #[test]
    fn track_outside_effect_is_noop() {
        let target = Target::record();
        track(&target, TrackOpType::Get, Key::from("a"));
        assert!(!TargetMap::contains(target.id()));
    }

    #[test]
    fn track_while_paused_is_noop() {
        let target = Target::record();
        let effect = {
            let target = target.clone();
            ReactiveEffect::new(move || {
                context::untracked(|| track(&target, TrackOpType::Get, Key::from("a")));
            })
        };
        effect.run();
        assert!(TargetMap::tracked_keys(&target).is_empty());
        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let target = Target::record();
        let runs = Arc::new(AtomicUsize::new(0));
        let effect = tracking_effect(&target, vec![Key::from("a"), Key::from("a")], &runs);

        assert_eq!(effect.dependency_count(), 1);
        let dep = TargetMap::dep(&target, &Key::from("a")).unwrap();
        assert_eq!(dep.subscriber_ids(), vec![effect.id()]);
    }

    #[test]
    fn set_triggers_exact_key() {
        let target = Target::record();
        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = tracking_effect(&target, vec![Key::from("a")], &runs);

        trigger(&target, TriggerOpType::Set, Some(Key::from("b")), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        trigger(&target, TriggerOpType::Set, Some(Key::from("a")), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn add_and_delete_trigger_iteration() {
        let target = Target::record();
        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = tracking_effect(&target, vec![Key::Iterate], &runs);

        trigger(&target, TriggerOpType::Set, Some(Key::from("x")), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        trigger(&target, TriggerOpType::Add, Some(Key::from("x")), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        trigger(&target, TriggerOpType::Delete, Some(Key::from("x")), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn collection_set_triggers_iteration() {
        let target = Target::collection();
        let runs = Arc::new(AtomicUsize::new(0));
        let key_runs = Arc::new(AtomicUsize::new(0));
        let _values = tracking_effect(&target, vec![Key::Iterate], &runs);
        let _keys = tracking_effect(&target, vec![Key::MapKeyIterate], &key_runs);

        trigger(&target, TriggerOpType::Set, Some(Key::from("k")), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(key_runs.load(Ordering::SeqCst), 1);

        trigger(&target, TriggerOpType::Add, Some(Key::from("j")), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(key_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_triggers_every_key() {
        let target = Target::collection();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let _ea = tracking_effect(&target, vec![Key::from("a")], &a);
        let _eb = tracking_effect(&target, vec![Key::from("b")], &b);

        trigger(&target, TriggerOpType::Clear, None, None, None);
        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn length_write_triggers_out_of_range_indices() {
        let target = Target::sequence([1, 2, 3]);
        let first = Arc::new(AtomicUsize::new(0));
        let third = Arc::new(AtomicUsize::new(0));
        let length = Arc::new(AtomicUsize::new(0));
        let _e0 = tracking_effect(&target, vec![Key::Index(0)], &first);
        let _e2 = tracking_effect(&target, vec![Key::Index(2)], &third);
        let _el = tracking_effect(&target, vec![Key::length()], &length);

        trigger(
            &target,
            TriggerOpType::Set,
            Some(Key::length()),
            Some(Value::from(1)),
            Some(Value::from(3)),
        );

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 2);
        assert_eq!(length.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sequence_add_triggers_length() {
        let target = Target::sequence([1]);
        let length = Arc::new(AtomicUsize::new(0));
        let iterate = Arc::new(AtomicUsize::new(0));
        let _el = tracking_effect(&target, vec![Key::length()], &length);
        let _ei = tracking_effect(&target, vec![Key::Iterate], &iterate);

        trigger(&target, TriggerOpType::Add, Some(Key::Index(1)), None, None);
        assert_eq!(length.load(Ordering::SeqCst), 2);
        assert_eq!(iterate.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn merged_deps_notify_each_node_once() {
        let target = Target::record();
        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = tracking_effect(&target, vec![Key::from("a"), Key::Iterate], &runs);

        trigger(&target, TriggerOpType::Add, Some(Key::from("a")), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn computed_nodes_fire_before_plain_nodes() {
        let target = Target::record();
        let order = Arc::new(Mutex::new(Vec::new()));

        let plain = {
            let target = target.clone();
            let order = order.clone();
            ReactiveEffect::with_scheduler(
                move || track(&target, TrackOpType::Get, Key::from("a")),
                move || order.lock().push("plain"),
            )
        };
        let derived = {
            let target = target.clone();
            let order = order.clone();
            ReactiveEffect::build(
                move || track(&target, TrackOpType::Get, Key::from("a")),
                EffectOptions::default().scheduler(move || order.lock().push("computed")),
                true,
                true,
            )
        };
        plain.run();
        derived.run();

        trigger(&target, TriggerOpType::Set, Some(Key::from("a")), None, None);
        assert_eq!(*order.lock(), vec!["computed", "plain"]);
    }

    #[test]
    fn dropping_target_discards_entry() {
        let target = Target::record();
        let id = target.id();
        let runs = Arc::new(AtomicUsize::new(0));
        let effect = tracking_effect(&target, vec![Key::from("a")], &runs);
        assert!(TargetMap::contains(id));

        // the effect closure holds the other handle
        drop(effect);
        drop(target);
        assert!(!TargetMap::contains(id));
    }
}
