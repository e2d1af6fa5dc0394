//! Observable Wrappers
//!
//! A [`Reactive`] is the interception layer presented to code instead of a
//! raw [`Target`]. Reads through it register dependencies, writes through it
//! notify dependents.
//!
//! # Variants
//!
//! There is one wrapper type. Its behavior is selected by two independent
//! flags, [`ProxyFlags::readonly`] and [`ProxyFlags::shallow`]:
//!
//! | variant            | tracks reads | accepts writes | wraps nested objects |
//! |--------------------|--------------|----------------|----------------------|
//! | `reactive`         | yes          | yes            | as `reactive`        |
//! | `shallow_reactive` | yes          | yes            | no                   |
//! | `readonly`         | no           | no             | as `readonly`        |
//! | `shallow_readonly` | no           | no             | no                   |
//!
//! # Identity
//!
//! Wrappers are cached weakly on the wrapped value, one slot per flag
//! combination. Observing the same target twice with the same flags yields
//! the same wrapper for as long as any handle to it is alive.
//!
//! A read-only view of a mutable wrapper wraps the wrapper itself, so reads
//! through the view are still tracked by the mutable layer below it.

mod handler;
mod sequence;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

use crate::config;
use crate::error::{ReactiveError, Result};
use crate::value::{Target, TargetKind, Value};

/// Behavior switches of a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProxyFlags {
    /// Reject writes and never track reads.
    pub readonly: bool,
    /// Return nested values as stored instead of wrapping them.
    pub shallow: bool,
}

impl ProxyFlags {
    pub const REACTIVE: Self = Self {
        readonly: false,
        shallow: false,
    };
    pub const SHALLOW_REACTIVE: Self = Self {
        readonly: false,
        shallow: true,
    };
    pub const READONLY: Self = Self {
        readonly: true,
        shallow: false,
    };
    pub const SHALLOW_READONLY: Self = Self {
        readonly: true,
        shallow: true,
    };

    fn slot(self) -> usize {
        (usize::from(self.readonly) << 1) | usize::from(self.shallow)
    }
}

/// Weak per-flag wrapper slots attached to a target or wrapper.
#[derive(Default)]
pub(crate) struct ProxyCache {
    slots: Mutex<[Weak<ProxyInner>; 4]>,
}

impl ProxyCache {
    fn get(&self, flags: ProxyFlags) -> Option<Reactive> {
        self.slots.lock()[flags.slot()]
            .upgrade()
            .map(|inner| Reactive { inner })
    }

    fn get_or_insert_with(&self, flags: ProxyFlags, create: impl FnOnce() -> ProxyInner) -> Reactive {
        let mut slots = self.slots.lock();
        let slot = &mut slots[flags.slot()];
        if let Some(inner) = slot.upgrade() {
            return Reactive { inner };
        }
        let inner = Arc::new(create());
        *slot = Arc::downgrade(&inner);
        Reactive { inner }
    }
}

/// What a wrapper intercepts.
#[derive(Clone)]
pub(crate) enum Base {
    Raw(Target),
    /// A read-only view of a mutable wrapper.
    Wrapped(Reactive),
}

pub(crate) struct ProxyInner {
    base: Base,
    flags: ProxyFlags,
    views: ProxyCache,
}

/// Handle to an observable wrapper.
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ProxyInner>,
}

impl Reactive {
    fn cached(base: Base, flags: ProxyFlags) -> Self {
        let cache = match &base {
            Base::Raw(target) => target.proxies(),
            Base::Wrapped(wrapper) => &wrapper.inner.views,
        };
        cache.get_or_insert_with(flags, || ProxyInner {
            base: base.clone(),
            flags,
            views: ProxyCache::default(),
        })
    }

    /// The flags this wrapper was created with.
    pub fn flags(&self) -> ProxyFlags {
        self.inner.flags
    }

    /// Whether writes through this wrapper are rejected.
    pub fn is_readonly(&self) -> bool {
        self.inner.flags.readonly
    }

    /// Whether nested values are returned as stored.
    pub fn is_shallow(&self) -> bool {
        self.inner.flags.shallow
    }

    /// Whether writes to the underlying target are observed. A read-only
    /// view of a mutable wrapper counts as reactive.
    pub fn is_reactive(&self) -> bool {
        match &self.inner.base {
            Base::Wrapped(wrapper) if self.is_readonly() => wrapper.is_reactive(),
            _ => !self.is_readonly(),
        }
    }

    /// The raw target under every wrapping layer.
    pub fn to_raw(&self) -> Target {
        let mut wrapper = self;
        loop {
            match &wrapper.inner.base {
                Base::Raw(target) => return target.clone(),
                Base::Wrapped(inner) => wrapper = inner,
            }
        }
    }

    /// Kind of the raw target.
    pub fn kind(&self) -> TargetKind {
        self.to_raw().kind()
    }

    /// Whether both handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A deep read-only view of this wrapper.
    pub fn readonly(&self) -> Reactive {
        match observe(&Value::from(self), ProxyFlags::READONLY) {
            Value::Observed(view) => view,
            _ => self.clone(),
        }
    }

    pub(crate) fn base(&self) -> &Base {
        &self.inner.base
    }

    /// The value one layer down.
    pub(crate) fn base_value(&self) -> Value {
        match &self.inner.base {
            Base::Raw(target) => Value::Object(target.clone()),
            Base::Wrapped(wrapper) => Value::Observed(wrapper.clone()),
        }
    }

    /// Whether `receiver` is the wrapper cached for this wrapper's base and
    /// flags, i.e. the read did not arrive through some other object.
    pub(crate) fn is_canonical_for(&self, receiver: &Reactive) -> bool {
        let cache = match &self.inner.base {
            Base::Raw(target) => target.proxies(),
            Base::Wrapped(wrapper) => &wrapper.inner.views,
        };
        cache
            .get(self.inner.flags)
            .is_some_and(|cached| cached.ptr_eq(receiver))
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Reactive {}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.to_raw().id())
            .field("readonly", &self.is_readonly())
            .field("shallow", &self.is_shallow())
            .field("nested", &matches!(self.inner.base, Base::Wrapped(_)))
            .finish()
    }
}

/// Why `value` cannot be wrapped, or `None` if it can.
fn unobservable(value: &Value) -> Option<&'static str> {
    match value {
        Value::Object(target) if target.is_skipped() => Some("raw-marked object"),
        Value::Object(target) if target.kind() == TargetKind::Collection => Some("collection"),
        Value::Object(_) | Value::Observed(_) => None,
        other => Some(other.kind_name()),
    }
}

/// Wrap `value` with the given flags.
///
/// Values that cannot be observed (primitives, cells, raw-marked targets,
/// collections) are returned unchanged. An existing wrapper is returned
/// unchanged as well, except that a read-only view is made of a mutable one.
pub fn observe(value: &Value, flags: ProxyFlags) -> Value {
    match value {
        Value::Object(target) => {
            if let Some(kind) = unobservable(value) {
                if config::warnings_enabled() {
                    warn!(target_id = ?target.id(), kind, "value cannot be made reactive");
                }
                return value.clone();
            }
            Value::Observed(Reactive::cached(Base::Raw(target.clone()), flags))
        }
        Value::Observed(existing) => {
            if !flags.readonly || existing.is_readonly() {
                return value.clone();
            }
            Value::Observed(Reactive::cached(Base::Wrapped(existing.clone()), flags))
        }
        other => {
            if config::warnings_enabled() {
                warn!(kind = other.kind_name(), "value cannot be made reactive");
            }
            value.clone()
        }
    }
}

fn wrap(value: Value, flags: ProxyFlags) -> Result<Reactive> {
    match observe(&value, flags) {
        Value::Observed(wrapper) => Ok(wrapper),
        other => Err(ReactiveError::NotObservable {
            kind: unobservable(&other).unwrap_or("value"),
        }),
    }
}

/// Deep mutable wrapper. A read-only wrapper passed in is returned as is.
pub fn reactive(value: impl Into<Value>) -> Result<Reactive> {
    wrap(value.into(), ProxyFlags::REACTIVE)
}

/// Mutable wrapper that tracks only its own properties.
pub fn shallow_reactive(value: impl Into<Value>) -> Result<Reactive> {
    wrap(value.into(), ProxyFlags::SHALLOW_REACTIVE)
}

/// Deep read-only wrapper.
pub fn readonly(value: impl Into<Value>) -> Result<Reactive> {
    wrap(value.into(), ProxyFlags::READONLY)
}

/// Read-only wrapper whose nested values are returned as stored.
pub fn shallow_readonly(value: impl Into<Value>) -> Result<Reactive> {
    wrap(value.into(), ProxyFlags::SHALLOW_READONLY)
}

/// `observe` as a deep mutable wrapper when `value` is an object.
pub fn to_reactive(value: &Value) -> Value {
    if value.is_object() {
        observe(value, ProxyFlags::REACTIVE)
    } else {
        value.clone()
    }
}

/// `observe` as a deep read-only wrapper when `value` is an object.
pub fn to_readonly(value: &Value) -> Value {
    if value.is_object() {
        observe(value, ProxyFlags::READONLY)
    } else {
        value.clone()
    }
}

/// The raw target behind a wrapper; any other value is returned as is.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Observed(wrapper) => Value::Object(wrapper.to_raw()),
        other => other.clone(),
    }
}

/// Opt a target out of observation.
pub fn mark_raw(target: &Target) -> Target {
    target.mark_raw()
}

/// Whether writes to the value's target are observed.
pub fn is_reactive(value: &Value) -> bool {
    value.as_reactive().is_some_and(Reactive::is_reactive)
}

/// Read-only wrappers and read-only cells.
pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Observed(wrapper) => wrapper.is_readonly(),
        Value::Ref(cell) => cell.is_readonly(),
        _ => false,
    }
}

/// Shallow wrappers and shallow cells.
pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Observed(wrapper) => wrapper.is_shallow(),
        Value::Ref(cell) => cell.is_shallow(),
        _ => false,
    }
}

/// Whether the value is a wrapper of any variant.
pub fn is_proxy(value: &Value) -> bool {
    matches!(value, Value::Observed(_))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
