//! Effect Implementation
//!
//! A `ReactiveEffect` is a computation node: it wraps a function and, each
//! time it runs, records every reactive read the function performs. When
//! one of those reads is later invalidated, the node is notified and either
//! re-runs or hands control to its scheduler.
//!
//! # Run Protocol
//!
//! 1. A stopped node just calls its function, without tracking.
//!
//! 2. If the node already appears in the chain of running nodes (through
//!    the `parent` links), the run is skipped. This keeps a node that writes
//!    what it reads from recursing forever.
//!
//! 3. Otherwise the node becomes the active effect, its current dependencies
//!    are marked as "was tracked", and the function runs. Reads mark their
//!    dependency as "newly tracked" and subscribe the node if needed.
//!
//! 4. Afterwards, dependencies that were tracked before but not during this
//!    run are dropped, and the previous active effect is restored. This step
//!    runs from a drop guard, so it also happens when the function panics.
//!
//! Beyond the marker window (30 nested runs by default) the node instead
//! leaves all its dependencies before running and re-subscribes from
//! scratch.
//!
//! # Ownership
//!
//! Dependency sets hold nodes weakly. A node lives as long as one of its
//! handles does; dropping the last handle detaches it from the graph.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::graph::Dep;

use super::context;
use super::subscriber::{DebuggerEvent, EffectId, EffectNode};

/// Callback invoked instead of re-running a node when it is triggered.
pub type Scheduler = Arc<dyn Fn() + Send + Sync>;

/// Callback receiving dependency tracking or triggering events.
pub type DebugHook = Arc<dyn Fn(&DebuggerEvent) + Send + Sync>;

/// Callback invoked once when a node stops.
pub type StopHook = Arc<dyn Fn() + Send + Sync>;

/// Options for creating an effect.
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run the effect on creation.
    pub lazy: bool,
    pub scheduler: Option<Scheduler>,
    /// Let the node be triggered by writes it performs while running.
    pub allow_recurse: bool,
    pub on_stop: Option<StopHook>,
    pub on_track: Option<DebugHook>,
    pub on_trigger: Option<DebugHook>,
}

impl EffectOptions {
    /// Options for an effect that waits for its first explicit `run`.
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            ..Self::default()
        }
    }

    /// Call `scheduler` on trigger instead of re-running.
    pub fn scheduler<S>(mut self, scheduler: S) -> Self
    where
        S: Fn() + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Let writes made during the run trigger the effect itself.
    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    /// Run `on_stop` once when the effect stops.
    pub fn on_stop<F>(mut self, on_stop: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_stop = Some(Arc::new(on_stop));
        self
    }

    /// Receive an event for every dependency the effect subscribes to.
    pub fn on_track<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_track = Some(Arc::new(hook));
        self
    }

    /// Receive an event for every mutation that reaches the effect.
    pub fn on_trigger<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_trigger = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("allow_recurse", &self.allow_recurse)
            .field("on_stop", &self.on_stop.is_some())
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .finish()
    }
}

/// Bookkeeping shared by every node regardless of its result type.
pub(crate) struct EffectCore {
    id: EffectId,
    active: AtomicBool,
    defer_stop: AtomicBool,
    computed: bool,
    allow_recurse: bool,

    /// The node that was active when this one started running.
    /// Only set while this node runs.
    parent: Mutex<Option<Arc<dyn EffectNode>>>,

    /// Dependency sets this node is subscribed to.
    deps: Mutex<SmallVec<[Arc<Dep>; 4]>>,

    scheduler: Option<Scheduler>,
    on_stop: Option<StopHook>,
    on_track: Option<DebugHook>,
    on_trigger: Option<DebugHook>,
}

impl EffectCore {
    fn new(options: EffectOptions, computed: bool, active: bool) -> Self {
        Self {
            id: EffectId::new(),
            active: AtomicBool::new(active),
            defer_stop: AtomicBool::new(false),
            computed,
            allow_recurse: options.allow_recurse,
            parent: Mutex::new(None),
            deps: Mutex::new(SmallVec::new()),
            scheduler: options.scheduler,
            on_stop: options.on_stop,
            on_track: options.on_track,
            on_trigger: options.on_trigger,
        }
    }

    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether this node backs a computed value. Those are triggered first.
    pub(crate) fn is_computed(&self) -> bool {
        self.computed
    }

    pub(crate) fn allow_recurse(&self) -> bool {
        self.allow_recurse
    }

    pub(crate) fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    pub(crate) fn on_track(&self) -> Option<&DebugHook> {
        self.on_track.as_ref()
    }

    pub(crate) fn on_trigger(&self) -> Option<&DebugHook> {
        self.on_trigger.as_ref()
    }

    pub(crate) fn push_dep(&self, dep: Arc<Dep>) {
        self.deps.lock().push(dep);
    }

    pub(crate) fn dep_count(&self) -> usize {
        self.deps.lock().len()
    }

    fn parent(&self) -> Option<Arc<dyn EffectNode>> {
        self.parent.lock().clone()
    }

    /// Whether this node is the active effect or one of its ancestors.
    fn is_running(&self) -> bool {
        let mut cursor = context::active_effect();
        while let Some(node) = cursor {
            if node.core().id == self.id {
                return true;
            }
            cursor = node.core().parent();
        }
        false
    }

    fn init_dep_markers(&self, bit: u32) {
        for dep in self.deps.lock().iter() {
            dep.mark_was_tracked(bit);
        }
    }

    fn finalize_dep_markers(&self, bit: u32) {
        let id = self.id;
        self.deps.lock().retain(|dep| {
            let stale = dep.was_tracked(bit) && !dep.newly_tracked(bit);
            if stale {
                dep.remove(id);
            }
            dep.clear_markers(bit);
            !stale
        });
    }

    /// Leave every dependency set.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.lock());
        for dep in &deps {
            dep.remove(self.id);
        }
    }

    /// Stop the node. While it is running, as the active effect or as an
    /// ancestor of it, the stop waits for its run to return so that the
    /// run's dependency markers are finalized first.
    pub(crate) fn stop(&self) {
        if self.is_running() {
            self.defer_stop.store(true, Ordering::SeqCst);
            debug!(effect = ?self.id, "stop deferred until the running effect returns");
        } else if self.active.swap(false, Ordering::SeqCst) {
            self.cleanup();
            if let Some(on_stop) = &self.on_stop {
                on_stop();
            }
            debug!(effect = ?self.id, "effect stopped");
        }
    }
}

/// Activation of one node for the duration of a run.
///
/// Dropping the scope finalizes dependency markers and restores the
/// previous active effect, also on unwind.
struct RunScope {
    node: Arc<dyn EffectNode>,
    last_should_track: bool,
    marker_bit: Option<u32>,
}

impl RunScope {
    fn enter(node: Arc<dyn EffectNode>) -> Self {
        *node.core().parent.lock() = context::active_effect();
        let (last_should_track, depth) = context::push_active(Arc::clone(&node));
        let (_, limit) = context::depth();

        let marker_bit = if depth <= limit {
            let bit = context::op_bit(depth);
            node.core().init_dep_markers(bit);
            Some(bit)
        } else {
            node.core().cleanup();
            None
        };

        Self {
            node,
            last_should_track,
            marker_bit,
        }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        let core = self.node.core();
        if let Some(bit) = self.marker_bit {
            core.finalize_dep_markers(bit);
        }

        let parent = core.parent.lock().take();
        let replaced = context::pop_active(parent, self.last_should_track);
        drop(replaced);

        if core.defer_stop.swap(false, Ordering::SeqCst) {
            core.stop();
        }
    }
}

struct EffectInner<T> {
    core: EffectCore,
    func: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: 'static> EffectNode for EffectInner<T> {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn rerun(self: Arc<Self>) {
        let _ = run_node(&self);
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        self.core.cleanup();
    }
}

fn run_node<T: 'static>(inner: &Arc<EffectInner<T>>) -> Option<T> {
    if !inner.core.is_active() {
        return Some((inner.func)());
    }

    if inner.core.is_running() {
        trace!(effect = ?inner.core.id, "skipping recursive run");
        return None;
    }

    let node: Arc<dyn EffectNode> = Arc::clone(inner) as Arc<dyn EffectNode>;
    let _scope = RunScope::enter(node);
    Some((inner.func)())
}

/// A re-runnable computation that records its dependencies.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(&Target::record_from([("count", 1)]))?;
///
/// let effect = {
///     let state = state.clone();
///     ReactiveEffect::new(move || state.get("count").as_number())
/// };
///
/// effect.run(); // subscribes to `count`
/// state.set("count", 2)?; // re-runs the effect
/// ```
pub struct ReactiveEffect<T = ()> {
    inner: Arc<EffectInner<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create a node that re-runs itself when triggered.
    ///
    /// The function does not run until [`run`](Self::run) is called.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(f, EffectOptions::default())
    }

    /// Create a node whose triggers invoke `scheduler` instead of re-running.
    pub fn with_scheduler<F, S>(f: F, scheduler: S) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn() + Send + Sync + 'static,
    {
        Self::with_options(f, EffectOptions::default().scheduler(scheduler))
    }

    /// Create a node from explicit options. `lazy` is ignored here.
    pub fn with_options<F>(f: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(f, options, false, true)
    }

    pub(crate) fn build<F>(f: F, options: EffectOptions, computed: bool, active: bool) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(EffectInner {
                core: EffectCore::new(options, computed, active),
                func: Box::new(f),
            }),
        }
    }

    /// Run the function, recording its dependencies.
    ///
    /// Returns `None` when the run was skipped because this node is already
    /// running further up the stack. A panic in the function propagates
    /// after the tracking state has been restored.
    pub fn run(&self) -> Option<T> {
        run_node(&self.inner)
    }

    /// Detach the node from every dependency and make it inert.
    ///
    /// Calling this while the node runs, from its own function or from an
    /// effect nested inside it, defers the stop until the run returns. Stopping twice has no further effect.
    pub fn stop(&self) {
        self.inner.core.stop();
    }
}

impl<T> ReactiveEffect<T> {
    /// Identity of the underlying node, shared by all clones.
    pub fn id(&self) -> EffectId {
        self.inner.core.id
    }

    /// Whether the node still tracks and reacts.
    pub fn is_active(&self) -> bool {
        self.inner.core.is_active()
    }

    /// Number of dependency sets the node is subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.core.dep_count()
    }
}

impl<T> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.inner.core.id)
            .field("active", &self.is_active())
            .field("computed", &self.inner.core.computed)
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Create an effect and run it immediately unless `options.lazy` is set.
///
/// The returned handle keeps the effect alive.
pub fn effect<T, F>(f: F, options: EffectOptions) -> ReactiveEffect<T>
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let lazy = options.lazy;
    let runner = ReactiveEffect::with_options(f, options);
    if !lazy {
        let _ = runner.run();
    }
    runner
}

/// Stop the effect behind a runner handle.
pub fn stop<T: 'static>(runner: &ReactiveEffect<T>) {
    runner.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
