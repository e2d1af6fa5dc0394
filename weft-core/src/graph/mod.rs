//! Dependency Graph
//!
//! The graph maps every observed target to its keys and every key to the
//! set of effect nodes that read it:
//!
//! ```text
//! target ──► key ──► Dep { effect, effect, ... }
//! ```
//!
//! Edges are bidirectional. A `Dep` knows its subscribers, and each effect
//! node keeps the list of `Dep`s it belongs to so that it can leave them
//! when it re-runs or stops.
//!
//! The per-target table itself lives in [`crate::reactive::TargetMap`]; this
//! module provides the building blocks it is made of.

mod dep;
mod key;
mod op;

pub use dep::Dep;
pub use key::{Key, ReactiveFlag};
pub(crate) use key::PROTO;
pub use op::{TrackOpType, TriggerOpType};
