//! Tracking Context
//!
//! Thread-local state describing the computation that is currently running:
//!
//! - the active effect node (if any),
//! - whether reads should register dependencies, with a stack so that
//!   suspensions nest,
//! - the effect nesting depth, which selects the marker bit used for
//!   dependency diffing.
//!
//! Nested runs are linked through each node's `parent` pointer rather than
//! an explicit stack. This is only sound because activation is always
//! nested and confined to one thread.

use std::cell::RefCell;
use std::sync::Arc;

use crate::config;

use super::subscriber::{EffectId, EffectNode};

struct TrackingState {
    active: Option<Arc<dyn EffectNode>>,
    should_track: bool,
    track_stack: Vec<bool>,
    depth: u32,
    /// Marker window captured when the outermost run starts, so that a
    /// configuration change cannot split one run between two strategies.
    marker_limit: u32,
}

thread_local! {
    static TRACKING: RefCell<TrackingState> = RefCell::new(TrackingState {
        active: None,
        should_track: true,
        track_stack: Vec::new(),
        depth: 0,
        marker_limit: config::MAX_MARKER_BITS,
    });
}

/// Suspend dependency tracking until the matching [`reset_tracking`].
pub fn pause_tracking() {
    TRACKING.with(|state| {
        let mut state = state.borrow_mut();
        let last = state.should_track;
        state.track_stack.push(last);
        state.should_track = false;
    });
}

/// Force dependency tracking on until the matching [`reset_tracking`].
pub fn enable_tracking() {
    TRACKING.with(|state| {
        let mut state = state.borrow_mut();
        let last = state.should_track;
        state.track_stack.push(last);
        state.should_track = true;
    });
}

/// Restore the tracking state saved by the last pause or enable.
pub fn reset_tracking() {
    TRACKING.with(|state| {
        let mut state = state.borrow_mut();
        state.should_track = state.track_stack.pop().unwrap_or(true);
    });
}

/// Whether reads would currently register a dependency.
pub fn is_tracking() -> bool {
    TRACKING.with(|state| {
        let state = state.borrow();
        state.should_track && state.active.is_some()
    })
}

/// Id of the effect currently running on this thread.
pub fn active_effect_id() -> Option<EffectId> {
    active_effect().map(|node| node.core().id())
}

/// Run `f` with tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _pause = TrackingPause::new();
    f()
}

/// Guard that suspends tracking and resets it when dropped, including on
/// unwind.
pub struct TrackingPause {
    _private: (),
}

impl TrackingPause {
    /// Pause tracking until the guard is dropped.
    pub fn new() -> Self {
        pause_tracking();
        Self { _private: () }
    }
}

impl Default for TrackingPause {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TrackingPause {
    fn drop(&mut self) {
        reset_tracking();
    }
}

pub(crate) fn should_track() -> bool {
    TRACKING.with(|state| state.borrow().should_track)
}

pub(crate) fn active_effect() -> Option<Arc<dyn EffectNode>> {
    TRACKING.with(|state| state.borrow().active.clone())
}

pub(crate) fn is_active(id: EffectId) -> bool {
    TRACKING.with(|state| {
        state
            .borrow()
            .active
            .as_ref()
            .is_some_and(|node| node.core().id() == id)
    })
}

/// Current nesting depth and marker window.
pub(crate) fn depth() -> (u32, u32) {
    TRACKING.with(|state| {
        let state = state.borrow();
        (state.depth, state.marker_limit)
    })
}

/// Marker bit owned by the given depth.
pub(crate) fn op_bit(depth: u32) -> u32 {
    1u32.checked_shl(depth).unwrap_or(0)
}

/// Install `node` as the active effect with tracking forced on.
///
/// Returns the previous tracking flag and the new depth.
pub(crate) fn push_active(node: Arc<dyn EffectNode>) -> (bool, u32) {
    TRACKING.with(|state| {
        let mut state = state.borrow_mut();
        if state.depth == 0 {
            state.marker_limit = config::marker_depth();
        }
        state.active = Some(node);
        let last = state.should_track;
        state.should_track = true;
        state.depth += 1;
        (last, state.depth)
    })
}

/// Undo [`push_active`], restoring `parent` as the active effect.
///
/// The replaced node handle is handed back so the caller drops it outside
/// the thread-local borrow.
pub(crate) fn pop_active(
    parent: Option<Arc<dyn EffectNode>>,
    last_should_track: bool,
) -> Option<Arc<dyn EffectNode>> {
    TRACKING.with(|state| {
        let mut state = state.borrow_mut();
        state.depth = state.depth.saturating_sub(1);
        state.should_track = last_should_track;
        std::mem::replace(&mut state.active, parent)
    })
}
