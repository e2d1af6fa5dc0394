//! Property interception.
//!
//! Every operation takes an explicit receiver: the wrapper the access was
//! made on. It differs from `self` only when the access falls through a
//! prototype chain, and then decides which wrapper may answer the raw flag
//! and which one triggers.

use tracing::warn;

use crate::config;
use crate::error::{ReactiveError, Result};
use crate::graph::{Key, ReactiveFlag, TrackOpType, TriggerOpType};
use crate::reactive::{track, trigger};
use crate::value::{has_changed, Target, Value};

use super::{is_readonly, is_shallow, observe, to_raw, Base, ProxyFlags, Reactive};

/// Read `key` from a raw target, continuing into its prototype chain.
/// Wrapped prototypes intercept the read with the original receiver.
fn raw_get(target: &Target, key: &Key, receiver: &Reactive) -> Value {
    if let Some(value) = target.get_own(key) {
        return value;
    }
    if let Key::Flag(ReactiveFlag::Skip) = key {
        return Value::Bool(target.is_skipped());
    }
    match target.prototype() {
        Some(Value::Observed(proto)) => proto.get_with_receiver(key.clone(), receiver),
        Some(Value::Object(proto)) => raw_get(&proto, key, receiver),
        _ => Value::Null,
    }
}

fn raw_has(target: &Target, key: &Key) -> bool {
    if target.contains_key(key) {
        return true;
    }
    match target.prototype() {
        Some(Value::Observed(proto)) => proto.has(key.clone()),
        Some(Value::Object(proto)) => raw_has(&proto, key),
        _ => false,
    }
}

fn warn_readonly(op: &'static str, key: &Key) {
    if config::warnings_enabled() {
        warn!(op, %key, "target is readonly");
    }
}

impl Reactive {
    /// Read a property.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.get_with_receiver(key.into(), self)
    }

    /// Read a property on behalf of `receiver`.
    pub fn get_with_receiver(&self, key: Key, receiver: &Reactive) -> Value {
        let flags = self.flags();
        match key {
            Key::Flag(ReactiveFlag::IsReactive) => return Value::Bool(!flags.readonly),
            Key::Flag(ReactiveFlag::IsReadonly) => return Value::Bool(flags.readonly),
            Key::Flag(ReactiveFlag::IsShallow) => return Value::Bool(flags.shallow),
            Key::Flag(ReactiveFlag::Raw) if self.is_canonical_for(receiver) => {
                return self.base_value();
            }
            _ => {}
        }

        let result = match self.base() {
            Base::Raw(target) => raw_get(target, &key, receiver),
            Base::Wrapped(inner) => inner.get_with_receiver(key.clone(), receiver),
        };

        if key.is_non_trackable() {
            return result;
        }

        if let (false, Base::Raw(target)) = (flags.readonly, self.base()) {
            track(target, TrackOpType::Get, key.clone());
        }

        if flags.shallow {
            return result;
        }

        if let Value::Ref(cell) = &result {
            // sequences of cells expose the cells themselves
            if self.to_raw().is_sequence() && key.is_index() {
                return result;
            }
            return cell.value();
        }

        if result.is_object() {
            let nested = if flags.readonly {
                ProxyFlags::READONLY
            } else {
                ProxyFlags::REACTIVE
            };
            return observe(&result, nested);
        }

        result
    }

    /// Write a property.
    ///
    /// Fails without writing on a read-only wrapper, or when a plain value
    /// would replace a read-only cell.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.set_with_receiver(key.into(), value.into(), self)
    }

    /// Write a property on behalf of `receiver`. Only a write whose receiver
    /// wraps this wrapper's own target triggers.
    pub fn set_with_receiver(&self, key: Key, value: Value, receiver: &Reactive) -> Result<()> {
        let flags = self.flags();
        if flags.readonly {
            warn_readonly("set", &key);
            return Err(ReactiveError::ReadonlyTarget { key });
        }
        let target = match self.base() {
            Base::Raw(target) => target,
            Base::Wrapped(inner) => return inner.set_with_receiver(key, value, receiver),
        };

        let mut value = value;
        let mut old = target.lookup(key.clone());

        if let Value::Ref(cell) = &old {
            if cell.is_readonly() && !value.is_ref() {
                warn_readonly("set", &key);
                return Err(ReactiveError::ReadonlyRef { key });
            }
        }

        if !flags.shallow {
            if !is_shallow(&value) && !is_readonly(&value) {
                old = to_raw(&old);
                value = to_raw(&value);
            }
            if !target.is_sequence() && !value.is_ref() {
                if let Value::Ref(cell) = &old {
                    return cell.set_value(value);
                }
            }
        }

        let had_key = target.contains_key(&key);
        self.ordinary_set(target, key.clone(), value.clone(), receiver)?;

        if target.ptr_eq(&receiver.to_raw()) {
            if !had_key {
                trigger(target, TriggerOpType::Add, Some(key), Some(value), None);
            } else if has_changed(&value, &old) {
                trigger(target, TriggerOpType::Set, Some(key), Some(value), Some(old));
            }
        }
        Ok(())
    }

    /// Store the value. A key missing from `target` is offered to a wrapped
    /// prototype first; the data always lands on the receiver's target.
    fn ordinary_set(&self, target: &Target, key: Key, value: Value, receiver: &Reactive) -> Result<()> {
        if !target.contains_key(&key) {
            if let Some(Value::Observed(proto)) = target.prototype() {
                return proto.set_with_receiver(key, value, receiver);
            }
        }
        receiver.to_raw().insert(key, value).map(drop)
    }

    /// Delete a property. Returns whether it was present.
    ///
    /// A sequence slot is reset to `Null`; `length` cannot be deleted.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        if self.is_readonly() {
            warn_readonly("delete", &key);
            return Err(ReactiveError::ReadonlyDelete { key });
        }
        let target = match self.base() {
            Base::Raw(target) => target,
            Base::Wrapped(inner) => return inner.delete(key),
        };

        if target.is_sequence() && key.is_length() {
            return Ok(false);
        }

        let had_key = target.contains_key(&key);
        match target.remove(&key) {
            Some(old) if had_key => {
                trigger(target, TriggerOpType::Delete, Some(key), None, Some(old));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Whether the property exists on the target or its prototype chain.
    /// Tracks the queried key.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let result = match self.base() {
            Base::Raw(target) => raw_has(target, &key),
            Base::Wrapped(inner) => inner.has(key.clone()),
        };

        if let (false, Base::Raw(target)) = (self.is_readonly(), self.base()) {
            if !key.is_flag() {
                track(target, TrackOpType::Has, key);
            }
        }
        result
    }

    /// Own keys of the target. Tracks the set of keys: `length` for a
    /// sequence, the iteration marker otherwise.
    pub fn own_keys(&self) -> Vec<Key> {
        match self.base() {
            Base::Raw(target) => {
                if !self.is_readonly() {
                    let key = if target.is_sequence() {
                        Key::length()
                    } else {
                        Key::Iterate
                    };
                    track(target, TrackOpType::Iterate, key);
                }
                target.keys()
            }
            Base::Wrapped(inner) => inner.own_keys(),
        }
    }

    /// Number of items of a sequence (tracking `length`), or number of own
    /// keys of a record (tracking iteration).
    pub fn len(&self) -> usize {
        if self.to_raw().is_sequence() {
            let len = self.get(Key::length()).as_number().unwrap_or_default();
            len as usize
        } else {
            self.own_keys().len()
        }
    }

    /// Whether [`len`](Self::len) is zero. Tracks the same way.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
