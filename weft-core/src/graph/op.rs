//! Operation kinds reported by tracking and triggering.

/// The kind of read that registered a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackOpType {
    Get,
    Has,
    Iterate,
}

/// The kind of mutation being propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerOpType {
    /// An existing key changed value.
    Set,
    /// A key became present.
    Add,
    /// A key was removed.
    Delete,
    /// A collection was emptied.
    Clear,
}
