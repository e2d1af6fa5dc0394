//! Engine Configuration
//!
//! A small process-wide configuration read on hot paths. It is installed
//! once at startup with [`configure`] and can be loaded from JSON.

use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Upper bound for the bitmask re-tracking window.
///
/// Each nesting level of running effects owns one bit of a `u32` marker,
/// which caps the window at 30 levels. Deeper runs fall back to a full
/// dependency cleanup before executing.
pub const MAX_MARKER_BITS: u32 = 30;

/// Runtime knobs for the reactivity engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReactiveConfig {
    /// Emit developer warnings (read-only writes, readonly computed writes).
    pub warnings: bool,

    /// Nesting depth up to which dependency diffing uses bitmask markers.
    pub marker_depth: u32,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            warnings: cfg!(debug_assertions),
            marker_depth: MAX_MARKER_BITS,
        }
    }
}

impl ReactiveConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        self.marker_depth = self.marker_depth.min(MAX_MARKER_BITS);
        self
    }
}

static CONFIG: OnceLock<RwLock<ReactiveConfig>> = OnceLock::new();

fn global() -> &'static RwLock<ReactiveConfig> {
    CONFIG.get_or_init(|| RwLock::new(ReactiveConfig::default()))
}

/// Install a new process-wide configuration.
pub fn configure(config: ReactiveConfig) {
    *global().write() = config.normalized();
}

/// Snapshot of the current configuration.
pub fn config() -> ReactiveConfig {
    *global().read()
}

pub(crate) fn warnings_enabled() -> bool {
    global().read().warnings
}

pub(crate) fn marker_depth() -> u32 {
    global().read().marker_depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = ReactiveConfig::from_json(r#"{ "warnings": false }"#).unwrap();
        assert!(!config.warnings);
        assert_eq!(config.marker_depth, MAX_MARKER_BITS);
    }

    #[test]
    fn marker_depth_is_clamped() {
        let config = ReactiveConfig::from_json(r#"{ "marker_depth": 64 }"#).unwrap();
        assert_eq!(config.marker_depth, MAX_MARKER_BITS);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ReactiveConfig::from_json(r#"{ "verbose": true }"#).unwrap_err();
        assert!(err.to_string().starts_with("invalid reactive configuration"));
    }
}
