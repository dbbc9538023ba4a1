// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline settings, stored as RON.

use crate::interval::ClockTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default undo depth
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid RON
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Timeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Edges closer than this attract edited positions; 0 disables snapping
    pub snapping_distance: ClockTime,
    /// Number of edits that can be undone
    pub history_depth: usize,
    /// Volume given to new layers
    pub default_layer_volume: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            snapping_distance: 0,
            history_depth: DEFAULT_HISTORY_DEPTH,
            default_layer_volume: 1.0,
        }
    }
}

impl TimelineConfig {
    /// Parse a RON document; missing fields take their defaults
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(source)?)
    }

    /// Load a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }
}
