//! Weft Core
//!
//! This crate provides the dependency-tracking engine of the Weft reactive
//! runtime. It implements:
//!
//! - Observable wrappers over records and sequences (deep or shallow,
//!   mutable or read-only)
//! - A global dependency graph from (target, key) to subscribed effects
//! - Effects with schedulers, nested runs and deferred stop
//! - Lazily recomputed computed values and reference cells
//!
//! Deciding *when* to flush re-runs is left to whoever installs a scheduler.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: dynamic values and the targets that hold them
//! - `graph`: dependency sets, keys and operation kinds
//! - `reactive`: tracking context, effects, computed values, cells and the
//!   runtime that connects them
//! - `observe`: the interception layer presented instead of raw targets
//! - `config`: process-wide settings
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{reactive, Computed, ReactiveEffect, Target};
//!
//! let state = reactive(Target::record_from([("a", 1)]))?;
//!
//! // Create a derived value
//! let plus_one = {
//!     let state = state.clone();
//!     Computed::new(move || state.get("a").as_number().unwrap_or_default() + 1.0)
//! };
//!
//! // Create an effect
//! let logger = {
//!     let state = state.clone();
//!     ReactiveEffect::new(move || println!("a = {:?}", state.get("a")))
//! };
//! logger.run();
//!
//! // Update the state
//! state.set("a", 5)?;
//! // Effect re-runs, prints: "a = Number(5)"
//! assert_eq!(plus_one.get(), 6.0);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod observe;
pub mod reactive;
pub mod value;

pub use config::{configure, ReactiveConfig};
pub use error::{ReactiveError, Result};
pub use graph::{Dep, Key, ReactiveFlag, TrackOpType, TriggerOpType};
pub use observe::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, observe, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, to_reactive, to_readonly, ProxyFlags, Reactive,
};
pub use reactive::{
    effect, enable_tracking, is_ref, pause_tracking, reset_tracking, stop, track, trigger,
    trigger_ref, unref, untracked, Computed, ComputedOptions, DebuggerEvent, EffectOptions,
    ReactiveEffect, Ref, RefLike, TargetMap,
};
pub use value::{Target, TargetKind, Value, MAX_SEQUENCE_LENGTH};
