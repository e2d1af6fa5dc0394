//! Dynamic values stored in targets.
//!
//! Targets hold [`Value`]s. Aggregates are held by handle, so a value can
//! refer to a raw [`Target`], to an observable wrapper of one, or to a
//! reference cell.
//!
//! # Equality
//!
//! Three comparisons are used by the engine:
//!
//! - [`same_value`]: change detection. `NaN` equals itself and `0` differs
//!   from `-0`. This is also the `PartialEq` of `Value`.
//! - [`strict_eq`]: index search. `NaN` never matches.
//! - [`same_value_zero`]: containment search. `NaN` matches itself and the
//!   two zeros are equal.
//!
//! Aggregates and cells compare by identity under all three.

mod target;

pub use target::{Target, TargetId, TargetKind, MAX_SEQUENCE_LENGTH};

use std::fmt;
use std::sync::Arc;

use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::observe::Reactive;
use crate::reactive::RefHandle;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    /// A raw target.
    Object(Target),
    /// An observable wrapper.
    Observed(Reactive),
    /// A reference cell or computed value.
    Ref(RefHandle),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Observed(_) => "observed",
            Value::Ref(_) => "ref",
        }
    }

    /// Whether the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Raw targets and wrappers.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Observed(_))
    }

    /// Reference cells and computed values.
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The raw target, if this is one. Wrappers are not unwrapped.
    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Object(target) => Some(target),
            _ => None,
        }
    }

    /// The wrapper, if this is one.
    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Observed(wrapper) => Some(wrapper),
            _ => None,
        }
    }

    /// The cell handle, if this is one.
    pub fn as_ref_cell(&self) -> Option<&RefHandle> {
        match self {
            Value::Ref(cell) => Some(cell),
            _ => None,
        }
    }

    /// The underlying target of a raw target or wrapper.
    pub fn raw_target(&self) -> Option<Target> {
        match self {
            Value::Object(target) => Some(target.clone()),
            Value::Observed(wrapper) => Some(wrapper.to_raw()),
            _ => None,
        }
    }

    /// A JSON snapshot, read raw and untracked. Cell contents are inlined.
    ///
    /// Fails with [`CyclicValue`](crate::ReactiveError::CyclicValue) when a
    /// target contains itself.
    pub fn to_json(&self) -> Result<JsonValue> {
        self.snapshot(&mut Vec::new())
    }

    pub(crate) fn snapshot(&self, stack: &mut Vec<TargetId>) -> Result<JsonValue> {
        Ok(match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Str(s) => JsonValue::String(s.to_string()),
            Value::Object(target) => target.snapshot(stack)?,
            Value::Observed(wrapper) => wrapper.to_raw().snapshot(stack)?,
            Value::Ref(cell) => cell.peek().snapshot(stack)?,
        })
    }
}

fn number_to_json(n: f64) -> JsonValue {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
    }
}

fn ref_identity(a: &RefHandle, b: &RefHandle) -> bool {
    a.cell_id() == b.cell_id()
}

/// Identity and `Object.is`-style equality, used for change detection.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_nan() && y.is_nan() {
                true
            } else {
                x == y && x.is_sign_negative() == y.is_sign_negative()
            }
        }
        _ => same_identity(a, b),
    }
}

/// Equality used by index searches: `NaN` is never found.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => same_identity(a, b),
    }
}

/// Equality used by containment searches: `NaN` is found, zeros are equal.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => same_identity(a, b),
    }
}

/// Whether replacing `old` with `new` is an observable change.
pub fn has_changed(new: &Value, old: &Value) -> bool {
    !same_value(new, old)
}

fn same_identity(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Observed(x), Value::Observed(y)) => x.ptr_eq(y),
        (Value::Ref(x), Value::Ref(y)) => ref_identity(x, y),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(target) => f.debug_tuple("Object").field(target).finish(),
            Value::Observed(wrapper) => f.debug_tuple("Observed").field(wrapper).finish(),
            Value::Ref(cell) => write!(f, "Ref({:?})", cell.cell_id()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl From<JsonValue> for Value {
    /// Arrays become sequences and objects become records.
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::from(s),
            JsonValue::Array(items) => Value::Object(Target::sequence(items)),
            JsonValue::Object(entries) => Value::Object(Target::record_from(entries)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Target> for Value {
    fn from(target: Target) -> Self {
        Value::Object(target)
    }
}

impl From<&Target> for Value {
    fn from(target: &Target) -> Self {
        Value::Object(target.clone())
    }
}

impl From<Reactive> for Value {
    fn from(wrapper: Reactive) -> Self {
        Value::Observed(wrapper)
    }
}

impl From<&Reactive> for Value {
    fn from(wrapper: &Reactive) -> Self {
        Value::Observed(wrapper.clone())
    }
}

impl From<RefHandle> for Value {
    fn from(cell: RefHandle) -> Self {
        Value::Ref(cell)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
