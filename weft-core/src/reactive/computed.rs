//! Computed Values
//!
//! A [`Computed`] caches the result of a getter and recomputes it lazily.
//!
//! # How It Works
//!
//! 1. The getter runs inside an effect whose scheduler only flips a dirty
//!    flag. Nothing is recomputed when an input changes.
//!
//! 2. The flag going from clean to dirty notifies the computed value's own
//!    subscribers. Further invalidations while dirty are absorbed.
//!
//! 3. Reading the value subscribes the reader and, if dirty, re-runs the
//!    getter.
//!
//! Computed effects are triggered ahead of plain effects, so an effect that
//! reads a computed value always sees it invalidated first.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config;
use crate::error::{ReactiveError, Result};
use crate::graph::Dep;
use crate::value::Value;

use super::cell::{CellId, RefLike};
use super::context;
use super::effect::{DebugHook, EffectOptions, ReactiveEffect};
use super::runtime::{track_effects, trigger_effects};
use super::subscriber::DebuggerEvent;

/// Options for creating a computed value.
#[derive(Clone)]
pub struct ComputedOptions {
    /// Cache results between invalidations. When false the getter runs on
    /// every read, untracked.
    pub cacheable: bool,
    pub on_track: Option<DebugHook>,
    pub on_trigger: Option<DebugHook>,
}

impl Default for ComputedOptions {
    fn default() -> Self {
        Self {
            cacheable: true,
            on_track: None,
            on_trigger: None,
        }
    }
}

impl ComputedOptions {
    /// Options for a computed value that recomputes on every read.
    pub fn uncached() -> Self {
        Self {
            cacheable: false,
            ..Self::default()
        }
    }

    /// Receive an event for every dependency the getter subscribes to.
    pub fn on_track<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_track = Some(Arc::new(hook));
        self
    }

    /// Receive an event for every mutation that invalidates the value.
    pub fn on_trigger<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_trigger = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ComputedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedOptions")
            .field("cacheable", &self.cacheable)
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .finish()
    }
}

type Setter<T> = Box<dyn Fn(T) + Send + Sync>;

/// State reachable from the scheduler. Kept apart from the cache so the
/// effect does not own its computed value.
struct DirtyState {
    dirty: AtomicBool,
    dep: Arc<Dep>,
}

struct ComputedInner<T> {
    id: CellId,
    state: Arc<DirtyState>,
    effect: ReactiveEffect<T>,
    cached: Mutex<Option<T>>,
    setter: Option<Setter<T>>,
    cacheable: bool,
}

/// A lazily recomputed, cached derived value.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(Target::record_from([("a", 1)]))?;
/// let plus_one = {
///     let state = state.clone();
///     Computed::new(move || state.get("a").as_number().unwrap_or_default() + 1.0)
/// };
///
/// assert_eq!(plus_one.get(), 2.0);
/// state.set("a", 5)?;
/// assert_eq!(plus_one.get(), 6.0);
/// ```
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A read-only computed value.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(getter, None, ComputedOptions::default())
    }

    /// A computed value whose writes are forwarded to `setter`.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self::build(getter, Some(Box::new(setter)), ComputedOptions::default())
    }

    /// A read-only computed value with explicit options.
    pub fn with_options<F>(getter: F, options: ComputedOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(getter, None, options)
    }

    fn build<F>(getter: F, setter: Option<Setter<T>>, options: ComputedOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let state = Arc::new(DirtyState {
            dirty: AtomicBool::new(true),
            dep: Dep::new(),
        });

        let scheduler = {
            let state = Arc::clone(&state);
            move || {
                if !state.dirty.swap(true, Ordering::SeqCst) {
                    trigger_effects(&state.dep);
                }
            }
        };

        let mut effect_options = EffectOptions::default().scheduler(scheduler);
        effect_options.on_track = options.on_track;
        effect_options.on_trigger = options.on_trigger;

        // an uncached computed value runs its getter bare
        let effect = ReactiveEffect::build(getter, effect_options, true, options.cacheable);

        Self {
            inner: Arc::new(ComputedInner {
                id: CellId::next(),
                state,
                effect,
                cached: Mutex::new(None),
                setter,
                cacheable: options.cacheable,
            }),
        }
    }

    /// Read the value, recomputing it if stale.
    ///
    /// Fails with [`ReactiveError::CyclicComputed`] when the getter reads
    /// this value before it ever produced one.
    pub fn try_get(&self) -> Result<T> {
        let inner = &self.inner;
        track_effects(&inner.state.dep);

        if inner.state.dirty.swap(false, Ordering::SeqCst) || !inner.cacheable {
            debug!(cell = ?inner.id, "recomputing");
            if let Some(value) = inner.effect.run() {
                *inner.cached.lock() = Some(value);
            }
        }

        inner.cached.lock().clone().ok_or(ReactiveError::CyclicComputed)
    }

    /// Read the value, recomputing it if stale.
    ///
    /// # Panics
    ///
    /// Panics if the getter depends on this value before it has one. See
    /// [`try_get`](Self::try_get).
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Forward a write to the setter. Without one the write is rejected.
    pub fn set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                if config::warnings_enabled() {
                    warn!(cell = ?self.inner.id, "write operation failed: computed value is readonly");
                }
                Err(ReactiveError::ReadonlyComputed)
            }
        }
    }
}

impl<T> Computed<T> {
    /// Identity shared by all clones of this value.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Whether the next read recomputes.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.dirty.load(Ordering::SeqCst)
    }

    /// Whether the value was created without a setter.
    pub fn is_readonly(&self) -> bool {
        self.inner.setter.is_none()
    }

    /// The effect that runs the getter.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }

    /// Number of effects subscribed to this value.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.dep.len()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .field("cacheable", &self.inner.cacheable)
            .field("readonly", &self.is_readonly())
            .finish()
    }
}

impl RefLike for Computed<Value> {
    fn cell_id(&self) -> CellId {
        self.inner.id
    }

    fn value(&self) -> Value {
        self.try_get().unwrap_or_default()
    }

    fn peek(&self) -> Value {
        context::untracked(|| self.try_get()).unwrap_or_default()
    }

    fn set_value(&self, value: Value) -> Result<()> {
        self.set(value)
    }

    fn trigger(&self) {
        trigger_effects(&self.inner.state.dep);
    }

    fn is_readonly(&self) -> bool {
        Computed::is_readonly(self)
    }
}

impl From<Computed<Value>> for Value {
    fn from(computed: Computed<Value>) -> Self {
        Value::Ref(Arc::new(computed))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Ref, ReactiveEffect};
    use std::sync::atomic::AtomicI32;

    fn counted_double(source: &Ref, calls: &Arc<AtomicI32>) -> Computed<f64> {
        let source = source.clone();
        let calls = calls.clone();
        Computed::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            source.get().as_number().unwrap_or_default() * 2.0
        })
    }

    #[test]
    fn computes_lazily_and_caches() {
        let source = Ref::new(1);
        let calls = Arc::new(AtomicI32::new(0));
        let double = counted_double(&source, &calls);

        assert!(double.is_dirty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(double.get(), 2.0);
        assert_eq!(double.get(), 2.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!double.is_dirty());
    }

    #[test]
    fn invalidation_marks_dirty_without_recomputing() {
        let source = Ref::new(1);
        let calls = Arc::new(AtomicI32::new(0));
        let double = counted_double(&source, &calls);
        double.get();

        source.set(2);
        source.set(3);
        assert!(double.is_dirty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(double.get(), 6.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribers_are_notified_once_per_clean_to_dirty() {
        let source = Ref::new(1);
        let calls = Arc::new(AtomicI32::new(0));
        let double = counted_double(&source, &calls);

        let notified = Arc::new(AtomicI32::new(0));
        let watcher = {
            let double = double.clone();
            let notified = notified.clone();
            ReactiveEffect::with_scheduler(
                move || {
                    double.get();
                },
                move || {
                    notified.fetch_add(1, Ordering::SeqCst);
                },
            )
        };
        watcher.run();

        source.set(2);
        source.set(3);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        watcher.run();
        source.set(4);
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn uncached_recomputes_on_every_read() {
        let source = Ref::new(1);
        let calls = Arc::new(AtomicI32::new(0));
        let plain = {
            let source = source.clone();
            let calls = calls.clone();
            Computed::with_options(
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    source.get().as_number().unwrap_or_default()
                },
                ComputedOptions::uncached(),
            )
        };

        plain.get();
        plain.get();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn setter_forwards_writes() {
        let source = Ref::new(1);
        let double = {
            let getter_source = source.clone();
            let setter_source = source.clone();
            Computed::with_setter(
                move || getter_source.get().as_number().unwrap_or_default() * 2.0,
                move |value: f64| setter_source.set(value / 2.0),
            )
        };

        double.set(10.0).unwrap();
        assert_eq!(source.peek(), Value::from(5));
        assert_eq!(double.get(), 10.0);
        assert!(!double.is_readonly());
    }

    #[test]
    fn write_without_setter_is_rejected() {
        let constant = Computed::new(|| 1);
        assert!(matches!(constant.set(2), Err(ReactiveError::ReadonlyComputed)));
        assert_eq!(constant.get(), 1);
    }

    #[test]
    fn self_dependency_is_reported() {
        let slot: Arc<Mutex<Option<Computed<i32>>>> = Arc::new(Mutex::new(None));
        let looped = {
            let slot = slot.clone();
            Computed::new(move || {
                let me = slot.lock().clone();
                me.map_or(0, |me| me.try_get().unwrap_or(-1))
            })
        };
        *slot.lock() = Some(looped.clone());

        assert_eq!(looped.get(), -1);
        slot.lock().take();
    }

    #[test]
    fn computed_value_is_a_readonly_cell() {
        let cell = Value::from(Computed::new(|| Value::from("x")));
        let handle = cell.as_ref_cell().unwrap();
        assert!(handle.is_readonly());
        assert_eq!(handle.value(), Value::from("x"));
        assert!(handle.set_value(Value::Null).is_err());
    }
}
