//! Property keys.
//!
//! A key addresses one slot of an observed target. Besides ordinary names
//! and sequence indices there are marker keys that never appear in target
//! data: the iteration markers used for "set of keys" dependencies, and the
//! reserved wrapper flags answered by the interception layer itself.

use std::fmt;
use std::sync::Arc;

/// Reserved keys intercepted by observable wrappers before any generic logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactiveFlag {
    /// Whether the target opted out of observation.
    Skip,
    /// Whether the wrapper is mutable.
    IsReactive,
    /// Whether the wrapper is read-only.
    IsReadonly,
    /// Whether the wrapper is shallow.
    IsShallow,
    /// The unwrapped target (only honored for the canonical receiver).
    Raw,
}

/// A property key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property.
    Name(Arc<str>),
    /// A sequence index (canonical integer names normalize to this).
    Index(usize),
    /// Whole-object iteration ("the set of keys present").
    Iterate,
    /// Key-only iteration of map-like collections.
    MapKeyIterate,
    /// A reserved wrapper flag.
    Flag(ReactiveFlag),
}

const LENGTH: &str = "length";

/// Name under which a record's prototype is addressed. Reads of it through
/// a wrapper are never tracked.
pub(crate) const PROTO: &str = "__proto__";

impl Key {
    /// The sequence length key.
    pub fn length() -> Self {
        Key::Name(Arc::from(LENGTH))
    }

    /// Whether this is the sequence length key.
    pub fn is_length(&self) -> bool {
        matches!(self, Key::Name(name) if &**name == LENGTH)
    }

    /// The index of an `Index` key.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            _ => None,
        }
    }

    /// Whether this key addresses a sequence slot.
    pub fn is_index(&self) -> bool {
        matches!(self, Key::Index(_))
    }

    /// Whether this is a reserved wrapper flag.
    pub fn is_flag(&self) -> bool {
        matches!(self, Key::Flag(_))
    }

    /// Keys whose reads are never registered as dependencies.
    pub(crate) fn is_non_trackable(&self) -> bool {
        match self {
            Key::Flag(_) | Key::Iterate | Key::MapKeyIterate => true,
            Key::Name(name) => &**name == PROTO,
            Key::Index(_) => false,
        }
    }
}

/// Parse a canonical array index: digits only, no leading zeros.
fn canonical_index(name: &str) -> Option<usize> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    name.parse().ok()
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        match canonical_index(name) {
            Some(index) => Key::Index(index),
            None => Key::Name(Arc::from(name)),
        }
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::from(name.as_str())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<ReactiveFlag> for Key {
    fn from(flag: ReactiveFlag) -> Self {
        Key::Flag(flag)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
            Key::Iterate => f.write_str("<iterate>"),
            Key::MapKeyIterate => f.write_str("<map key iterate>"),
            Key::Flag(flag) => write!(f, "<{flag:?}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_names_normalize_to_indices() {
        assert_eq!(Key::from("3"), Key::Index(3));
        assert_eq!(Key::from("0"), Key::Index(0));
        assert_eq!(Key::from("03"), Key::Name(Arc::from("03")));
        assert_eq!(Key::from("-1"), Key::Name(Arc::from("-1")));
        assert_eq!(Key::from(String::from("12")), Key::Index(12));
    }

    #[test]
    fn length_key() {
        assert!(Key::length().is_length());
        assert!(Key::from("length").is_length());
        assert!(!Key::Index(0).is_length());
    }

    #[test]
    fn reserved_keys_are_not_trackable() {
        assert!(Key::from(PROTO).is_non_trackable());
        assert!(!Key::from("__v_isRef").is_non_trackable());
        assert!(Key::Flag(ReactiveFlag::Raw).is_non_trackable());
        assert!(!Key::from("name").is_non_trackable());
        assert!(!Key::Index(4).is_non_trackable());
    }
}
