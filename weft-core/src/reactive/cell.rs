//! Reference Cells
//!
//! A [`Ref`] is a single mutable slot whose reads and writes are observed
//! like any property of a wrapped target. Cells own their dependency set
//! directly instead of going through the target map.
//!
//! Deep cells store objects as deep reactive wrappers and compare writes by
//! raw identity; shallow cells store and compare values as given.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::graph::Dep;
use crate::observe::{self, to_raw, to_reactive};
use crate::value::{has_changed, Value};

use super::runtime::{track_effects, trigger_effects};

/// Identity of a reference cell or computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Anything that can sit in a [`Value::Ref`] slot.
pub trait RefLike: Send + Sync {
    fn cell_id(&self) -> CellId;

    /// Read the content, tracking the read.
    fn value(&self) -> Value;

    /// Read the content without tracking.
    fn peek(&self) -> Value;

    /// Replace the content.
    fn set_value(&self, value: Value) -> Result<()>;

    /// Notify subscribers even though the content was not replaced.
    fn trigger(&self);

    fn is_readonly(&self) -> bool {
        false
    }

    fn is_shallow(&self) -> bool {
        false
    }
}

/// Shared handle stored in values.
pub type RefHandle = Arc<dyn RefLike>;

struct RefInner {
    id: CellId,
    shallow: bool,
    /// Raw form of the content, used for change detection.
    raw: RwLock<Value>,
    value: RwLock<Value>,
    dep: Arc<Dep>,
}

/// An observed single-value cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
/// let doubled = {
///     let count = count.clone();
///     Computed::new(move || count.get().as_number().unwrap_or_default() * 2.0)
/// };
///
/// count.set(2);
/// assert_eq!(doubled.get(), 4.0);
/// ```
#[derive(Clone)]
pub struct Ref {
    inner: Arc<RefInner>,
}

impl Ref {
    /// A deep cell. Objects are stored as reactive wrappers.
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::create(to_raw(&value), to_reactive(&value), false)
    }

    /// A shallow cell. Only replacing the content is observed.
    pub fn shallow(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::create(value.clone(), value, true)
    }

    fn create(raw: Value, value: Value, shallow: bool) -> Self {
        Self {
            inner: Arc::new(RefInner {
                id: CellId::next(),
                shallow,
                raw: RwLock::new(raw),
                value: RwLock::new(value),
                dep: Dep::new(),
            }),
        }
    }

    /// Identity shared by all clones of this cell.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Read the content, subscribing the running effect.
    pub fn get(&self) -> Value {
        track_effects(&self.inner.dep);
        self.inner.value.read().clone()
    }

    /// Read the content without subscribing.
    pub fn peek(&self) -> Value {
        self.inner.value.read().clone()
    }

    /// Replace the content, notifying subscribers if it changed.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        let direct = self.inner.shallow || observe::is_shallow(&value) || observe::is_readonly(&value);
        let raw = if direct { value.clone() } else { to_raw(&value) };

        if !has_changed(&raw, &self.inner.raw.read()) {
            return;
        }

        let stored = if direct { value } else { to_reactive(&value) };
        let old_raw = std::mem::replace(&mut *self.inner.raw.write(), raw);
        let old_value = std::mem::replace(&mut *self.inner.value.write(), stored);
        drop((old_raw, old_value));

        trigger_effects(&self.inner.dep);
    }

    /// Notify subscribers without replacing the content, e.g. after
    /// mutating a shallow cell's content in place.
    pub fn trigger(&self) {
        trigger_effects(&self.inner.dep);
    }

    /// Whether the cell stores its content as given.
    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }

    /// Number of effects subscribed to this cell.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.len()
    }
}

impl RefLike for Ref {
    fn cell_id(&self) -> CellId {
        self.inner.id
    }

    fn value(&self) -> Value {
        self.get()
    }

    fn peek(&self) -> Value {
        Ref::peek(self)
    }

    fn set_value(&self, value: Value) -> Result<()> {
        self.set(value);
        Ok(())
    }

    fn trigger(&self) {
        Ref::trigger(self);
    }

    fn is_shallow(&self) -> bool {
        self.inner.shallow
    }
}

impl From<Ref> for Value {
    fn from(cell: Ref) -> Self {
        Value::Ref(Arc::new(cell))
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.inner.id)
            .field("shallow", &self.inner.shallow)
            .field("value", &self.peek())
            .finish()
    }
}

/// Whether the value is a reference cell or computed value.
pub fn is_ref(value: &Value) -> bool {
    value.is_ref()
}

/// The content of a cell (tracked), or the value itself.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(cell) => cell.value(),
        other => other.clone(),
    }
}

/// Force a notification of a cell's subscribers. No-op for other values.
pub fn trigger_ref(value: &Value) {
    if let Value::Ref(cell) = value {
        cell.trigger();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{is_reactive, reactive};
    use crate::reactive::ReactiveEffect;
    use crate::value::Target;
    use std::sync::atomic::AtomicUsize;

    fn watch(cell: &Ref, runs: &Arc<AtomicUsize>) -> ReactiveEffect {
        let cell = cell.clone();
        let runs = runs.clone();
        let effect = ReactiveEffect::new(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            cell.get();
        });
        effect.run();
        effect
    }

    #[test]
    fn set_triggers_only_on_change() {
        let cell = Ref::new(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = watch(&cell, &runs);

        cell.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        cell.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(cell.subscriber_count(), 1);
    }

    #[test]
    fn deep_cell_wraps_objects() {
        let target = Target::record();
        let cell = Ref::new(&target);
        assert!(is_reactive(&cell.peek()));

        // same raw target behind a wrapper is not a change
        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = watch(&cell, &runs);
        cell.set(reactive(&target).unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shallow_cell_stores_as_given() {
        let target = Target::record();
        let cell = Ref::shallow(&target);
        assert_eq!(cell.peek(), Value::from(&target));
        assert!(cell.is_shallow());
    }

    #[test]
    fn trigger_ref_forces_notification() {
        let cell = Ref::shallow(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = watch(&cell, &runs);

        trigger_ref(&Value::from(cell.clone()));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        trigger_ref(&Value::from(1));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unref_reads_through_cells() {
        let cell = Value::from(Ref::new("x"));
        assert!(is_ref(&cell));
        assert_eq!(unref(&cell), Value::from("x"));
        assert_eq!(unref(&Value::from(3)), Value::from(3));
    }

    #[test]
    fn handles_share_identity() {
        let cell = Ref::new(1);
        let a = Value::from(cell.clone());
        let b = Value::from(cell.clone());
        assert_eq!(a, b);
        assert_ne!(a, Value::from(Ref::new(1)));
    }
}
