//! Observed targets.
//!
//! A [`Target`] is an identity-bearing handle to application data. Clones
//! share the same storage; the engine never copies a target. Everything in
//! this module is raw access: no reads are tracked and no writes trigger.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};

use crate::error::{ReactiveError, Result};
use crate::graph::{Key, PROTO};
use crate::observe::ProxyCache;
use crate::reactive::TargetMap;

use super::Value;

/// Stable identity of a target, used as the dependency graph key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Largest length a sequence can take. Writes of an index at or above it,
/// or of a larger `length`, are rejected with
/// [`InvalidKey`](ReactiveError::InvalidKey).
pub const MAX_SEQUENCE_LENGTH: usize = u32::MAX as usize;

/// Shape of a target's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Named properties in insertion order, with an optional prototype.
    Record,
    /// Ordered items addressed by index, plus `length`.
    Sequence,
    /// Map-like storage. Only reachable through [`track`](crate::track) and
    /// [`trigger`](crate::trigger); generic wrappers do not observe it.
    Collection,
}

impl TargetKind {
    /// Lowercase name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            TargetKind::Record => "record",
            TargetKind::Sequence => "sequence",
            TargetKind::Collection => "collection",
        }
    }
}

enum TargetData {
    Entries(IndexMap<Key, Value>),
    Items(Vec<Value>),
}

struct TargetInner {
    id: TargetId,
    kind: TargetKind,
    data: RwLock<TargetData>,
    prototype: RwLock<Option<Value>>,
    skip: AtomicBool,
    proxies: ProxyCache,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        TargetMap::forget(self.id);
    }
}

/// Handle to a piece of application data.
#[derive(Clone)]
pub struct Target {
    inner: Arc<TargetInner>,
}

impl Target {
    fn with_data(kind: TargetKind, data: TargetData) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                id: TargetId::next(),
                kind,
                data: RwLock::new(data),
                prototype: RwLock::new(None),
                skip: AtomicBool::new(false),
                proxies: ProxyCache::default(),
            }),
        }
    }

    /// An empty record.
    pub fn record() -> Self {
        Self::with_data(TargetKind::Record, TargetData::Entries(IndexMap::new()))
    }

    /// A record with the given entries, in order.
    pub fn record_from<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::with_data(TargetKind::Record, TargetData::Entries(entries))
    }

    /// A sequence holding `items`.
    pub fn sequence<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let items = items.into_iter().map(Into::into).collect();
        Self::with_data(TargetKind::Sequence, TargetData::Items(items))
    }

    /// An empty map-like collection.
    pub fn collection() -> Self {
        Self::with_data(TargetKind::Collection, TargetData::Entries(IndexMap::new()))
    }

    /// Identity used by the dependency graph.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Shape of the storage.
    pub fn kind(&self) -> TargetKind {
        self.inner.kind
    }

    /// Whether the target is a sequence.
    pub fn is_sequence(&self) -> bool {
        self.inner.kind == TargetKind::Sequence
    }

    /// Whether both handles refer to the same target.
    pub fn ptr_eq(&self, other: &Target) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The prototype of a record, if one is installed.
    pub fn prototype(&self) -> Option<Value> {
        self.inner.prototype.read().clone()
    }

    /// Install (or remove) the prototype of a record.
    ///
    /// The prototype must be a record or a wrapper of one, and must not
    /// lead back to this target.
    pub fn set_prototype(&self, prototype: Option<Value>) -> Result<()> {
        if self.inner.kind != TargetKind::Record {
            return Err(ReactiveError::InvalidKey {
                key: Key::from(PROTO),
                kind: self.inner.kind.name(),
            });
        }

        if let Some(proto) = &prototype {
            let mut cursor = match proto {
                Value::Object(target) => Some(target.clone()),
                Value::Observed(wrapper) => Some(wrapper.to_raw()),
                other => {
                    return Err(ReactiveError::NotObservable {
                        kind: other.kind_name(),
                    })
                }
            };
            while let Some(target) = cursor {
                if target.ptr_eq(self) {
                    return Err(ReactiveError::CyclicValue);
                }
                cursor = target.prototype().and_then(|p| p.raw_target());
            }
        }

        *self.inner.prototype.write() = prototype;
        Ok(())
    }

    /// Own value at `key`, or `Null`. A sequence answers `length` itself.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.get_own(&key.into()).unwrap_or_default()
    }

    pub(crate) fn get_own(&self, key: &Key) -> Option<Value> {
        match &*self.inner.data.read() {
            TargetData::Entries(entries) => entries.get(key).cloned(),
            TargetData::Items(items) => match key {
                Key::Index(index) => items.get(*index).cloned(),
                key if key.is_length() => Some(Value::from(items.len())),
                _ => None,
            },
        }
    }

    /// Value at `key`, falling back through the prototype chain.
    pub fn lookup(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        let mut cursor = Some(self.clone());
        while let Some(target) = cursor {
            if let Some(value) = target.get_own(&key) {
                return value;
            }
            cursor = target.prototype().and_then(|p| p.raw_target());
        }
        Value::Null
    }

    /// Whether `key` is an own key. Every index below the length is present.
    pub fn contains_key(&self, key: &Key) -> bool {
        match &*self.inner.data.read() {
            TargetData::Entries(entries) => entries.contains_key(key),
            TargetData::Items(items) => match key {
                Key::Index(index) => *index < items.len(),
                key => key.is_length(),
            },
        }
    }

    /// Write an own value, returning the previous one.
    ///
    /// Writing past the end of a sequence pads it with `Null`; writing
    /// `length` truncates or pads. Both are bounded by
    /// [`MAX_SEQUENCE_LENGTH`].
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = key.into();
        let value = value.into();
        let kind = self.inner.kind;
        let invalid = |key: Key| ReactiveError::InvalidKey {
            key,
            kind: kind.name(),
        };

        match &mut *self.inner.data.write() {
            TargetData::Entries(entries) => match key {
                Key::Name(_) | Key::Index(_) => Ok(entries.insert(key, value)),
                key => Err(invalid(key)),
            },
            TargetData::Items(items) => match key {
                Key::Index(index) if index >= MAX_SEQUENCE_LENGTH => Err(invalid(key)),
                Key::Index(index) => {
                    if index < items.len() {
                        Ok(Some(std::mem::replace(&mut items[index], value)))
                    } else {
                        items.resize(index, Value::Null);
                        items.push(value);
                        Ok(None)
                    }
                }
                key if key.is_length() => {
                    let old = items.len();
                    match value.as_number() {
                        Some(len)
                            if len >= 0.0
                                && len.fract() == 0.0
                                && len <= MAX_SEQUENCE_LENGTH as f64 =>
                        {
                            items.resize(len as usize, Value::Null);
                            Ok(Some(Value::from(old)))
                        }
                        _ => Err(invalid(key)),
                    }
                }
                key => Err(invalid(key)),
            },
        }
    }

    /// Remove an own key. A sequence slot is reset to `Null` instead, so
    /// the length is unchanged.
    pub fn remove(&self, key: &Key) -> Option<Value> {
        match &mut *self.inner.data.write() {
            TargetData::Entries(entries) => entries.shift_remove(key),
            TargetData::Items(items) => match key {
                Key::Index(index) if *index < items.len() => {
                    Some(std::mem::take(&mut items[*index]))
                }
                _ => None,
            },
        }
    }

    /// Remove every own key.
    pub fn clear(&self) {
        let removed = match &mut *self.inner.data.write() {
            TargetData::Entries(entries) => std::mem::take(entries).into_values().collect(),
            TargetData::Items(items) => std::mem::take(items),
        };
        drop(removed);
    }

    /// Own keys in order. A sequence lists its indices followed by `length`.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.inner.data.read() {
            TargetData::Entries(entries) => entries.keys().cloned().collect(),
            TargetData::Items(items) => (0..items.len())
                .map(Key::Index)
                .chain(std::iter::once(Key::length()))
                .collect(),
        }
    }

    /// Own values in order.
    pub fn to_vec(&self) -> Vec<Value> {
        match &*self.inner.data.read() {
            TargetData::Entries(entries) => entries.values().cloned().collect(),
            TargetData::Items(items) => items.clone(),
        }
    }

    /// Number of items or entries.
    pub fn len(&self) -> usize {
        match &*self.inner.data.read() {
            TargetData::Entries(entries) => entries.len(),
            TargetData::Items(items) => items.len(),
        }
    }

    /// Whether the target holds no items or entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opt this target out of observation. Wrapping it afterwards returns
    /// the raw target.
    pub fn mark_raw(&self) -> Self {
        self.inner.skip.store(true, Ordering::SeqCst);
        self.clone()
    }

    /// Whether [`mark_raw`](Self::mark_raw) was called.
    pub fn is_skipped(&self) -> bool {
        self.inner.skip.load(Ordering::SeqCst)
    }

    pub(crate) fn proxies(&self) -> &ProxyCache {
        &self.inner.proxies
    }

    pub(crate) fn snapshot(&self, stack: &mut Vec<TargetId>) -> Result<JsonValue> {
        if stack.contains(&self.id()) {
            return Err(ReactiveError::CyclicValue);
        }
        stack.push(self.id());

        let json = if self.is_sequence() {
            let items = self
                .to_vec()
                .iter()
                .map(|item| item.snapshot(stack))
                .collect::<Result<Vec<_>>>()?;
            JsonValue::Array(items)
        } else {
            let entries = self.keys().into_iter().zip(self.to_vec());
            let mut object = Map::new();
            for (key, value) in entries {
                object.insert(key.to_string(), value.snapshot(stack)?);
            }
            JsonValue::Object(object)
        };

        stack.pop();
        Ok(json)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("len", &self.len())
            .field("skip", &self.is_skipped())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_length_is_an_own_key() {
        let items = Target::sequence([1, 2, 3]);
        assert_eq!(items.get("length"), Value::from(3));
        assert!(items.contains_key(&Key::length()));
        assert!(items.contains_key(&Key::Index(2)));
        assert!(!items.contains_key(&Key::Index(3)));
        assert_eq!(items.keys().last(), Some(&Key::length()));
    }

    #[test]
    fn writing_past_the_end_pads_with_null() {
        let items = Target::sequence([1]);
        assert_eq!(items.insert(Key::Index(3), 4).unwrap(), None);
        assert_eq!(items.to_vec(), vec![Value::from(1), Value::Null, Value::Null, Value::from(4)]);
    }

    #[test]
    fn length_write_truncates() {
        let items = Target::sequence([1, 2, 3]);
        let old = items.insert(Key::length(), 1).unwrap();
        assert_eq!(old, Some(Value::from(3)));
        assert_eq!(items.to_vec(), vec![Value::from(1)]);
        assert!(items.insert(Key::length(), "x").is_err());
        assert!(items.insert("name", 1).is_err());
    }

    #[test]
    fn oversized_index_and_length_are_rejected() {
        let items = Target::sequence([1, 2]);
        assert!(matches!(
            items.insert(Key::from("18446744073709551615"), 1),
            Err(ReactiveError::InvalidKey { .. })
        ));
        assert!(matches!(
            items.insert(Key::Index(MAX_SEQUENCE_LENGTH), 1),
            Err(ReactiveError::InvalidKey { .. })
        ));
        assert!(matches!(
            items.insert(Key::length(), 1e300),
            Err(ReactiveError::InvalidKey { .. })
        ));
        assert!(items.insert(Key::length(), MAX_SEQUENCE_LENGTH as f64 + 1.0).is_err());
        assert_eq!(items.to_vec(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn removing_a_sequence_slot_keeps_length() {
        let items = Target::sequence(["a", "b"]);
        assert_eq!(items.remove(&Key::Index(0)), Some(Value::from("a")));
        assert_eq!(items.len(), 2);
        assert_eq!(items.get(Key::Index(0)), Value::Null);
    }

    #[test]
    fn record_keeps_insertion_order() {
        let record = Target::record_from([("b", 1), ("a", 2)]);
        record.insert("c", 3).unwrap();
        record.remove(&Key::from("b"));
        assert_eq!(record.keys(), vec![Key::from("a"), Key::from("c")]);
    }

    #[test]
    fn lookup_walks_the_prototype_chain() {
        let parent = Target::record_from([("inherited", 1)]);
        let child = Target::record();
        child.set_prototype(Some(Value::from(&parent))).unwrap();

        assert_eq!(child.get("inherited"), Value::Null);
        assert_eq!(child.lookup("inherited"), Value::from(1));
    }

    #[test]
    fn prototype_cycles_are_rejected() {
        let a = Target::record();
        let b = Target::record();
        a.set_prototype(Some(Value::from(&b))).unwrap();
        assert!(matches!(
            b.set_prototype(Some(Value::from(&a))),
            Err(ReactiveError::CyclicValue)
        ));
        assert!(Target::sequence([1]).set_prototype(Some(Value::from(&a))).is_err());
    }

    #[test]
    fn clones_share_identity() {
        let record = Target::record();
        let same = record.clone();
        same.insert("x", 1).unwrap();
        assert_eq!(record.get("x"), Value::from(1));
        assert_eq!(record, same);
        assert_ne!(record, Target::record());
    }

    #[test]
    fn mark_raw_sets_skip() {
        let record = Target::record();
        assert!(!record.is_skipped());
        assert!(record.mark_raw().is_skipped());
    }
}
