//! Error types for the reactivity engine.
//!
//! Rejected mutations are reported as values rather than panics: the caller
//! may inspect or ignore them. The only failures that unwind are panics
//! raised by user code inside an effect or computed getter.

use thiserror::Error;

use crate::graph::Key;

/// Errors reported by reactive operations.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A write went through a read-only wrapper.
    #[error("set operation on key \"{key}\" failed: target is readonly")]
    ReadonlyTarget { key: Key },

    /// A delete went through a read-only wrapper.
    #[error("delete operation on key \"{key}\" failed: target is readonly")]
    ReadonlyDelete { key: Key },

    /// A plain value was assigned over a read-only reference cell.
    #[error("cannot replace readonly reference stored at key \"{key}\"")]
    ReadonlyRef { key: Key },

    /// A computed value without a setter was written.
    #[error("write operation failed: computed value is readonly")]
    ReadonlyComputed,

    /// A computed value was read by its own getter before it had a value.
    #[error("computed value was read while computing its first value")]
    CyclicComputed,

    /// A sequence operation was invoked on a non-sequence target.
    #[error("`{op}` requires a sequence target")]
    NotASequence { op: &'static str },

    /// The key or value does not fit the target's storage, e.g. a named
    /// property on a sequence or a non-numeric length.
    #[error("key \"{key}\" cannot be written on a {kind} target")]
    InvalidKey { key: Key, kind: &'static str },

    /// The value cannot be placed under observation.
    #[error("value of kind {kind} cannot be observed")]
    NotObservable { kind: &'static str },

    /// A snapshot was requested for a self-referencing structure.
    #[error("cannot snapshot a cyclic structure")]
    CyclicValue,

    /// Configuration could not be parsed.
    #[error("invalid reactive configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
