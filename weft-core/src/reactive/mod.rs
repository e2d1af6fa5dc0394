//! Reactive Primitives
//!
//! This module implements the engine that connects reads to re-runs:
//! effects, computed values, reference cells and the runtime that records
//! which effect read what.
//!
//! # Concepts
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] wraps a function. Each run records every reactive
//! read; a later write to any of those reads re-runs the function, or calls
//! the scheduler installed on the effect.
//!
//! ## Computed Values
//!
//! A [`Computed`] is an effect whose scheduler only marks a cache dirty.
//! The getter re-runs on the next read.
//!
//! ## Reference Cells
//!
//! A [`Ref`] is a single observed slot, for state that is not a property of
//! some target.
//!
//! # Implementation Notes
//!
//! The active effect and the pause stack are thread-local: an effect tracks
//! what its own thread reads while it runs. The dependency graph is global
//! and keyed by target identity.

mod cell;
mod computed;
mod context;
mod effect;
mod runtime;
mod subscriber;

pub use cell::{is_ref, trigger_ref, unref, CellId, Ref, RefHandle, RefLike};
pub use computed::{Computed, ComputedOptions};
pub use context::{
    active_effect_id, enable_tracking, is_tracking, pause_tracking, reset_tracking, untracked,
    TrackingPause,
};
pub use effect::{effect, stop, DebugHook, EffectOptions, ReactiveEffect, Scheduler, StopHook};
pub use runtime::{track, track_effects, trigger, trigger_effects, TargetMap};
pub use subscriber::{DebugOp, DebuggerEvent, EffectId};

pub(crate) use subscriber::EffectNode;
