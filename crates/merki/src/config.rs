//! Engine tuning knobs, loadable from a JSON file.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Decal budgets. Missing fields in a config file fall back to these
/// defaults, so shipping a file with just the knob you care about works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecalConfig {
    /// Decals one model instance may hold before its oldest retires.
    pub max_decals_per_model: usize,
    /// Pooled decal vertex bytes across all models before the globally
    /// oldest decal retires.
    pub vertex_budget_bytes: usize,
}

impl Default for DecalConfig {
    fn default() -> Self {
        Self {
            max_decals_per_model: 50,
            vertex_budget_bytes: 256 * 1024,
        }
    }
}

impl DecalConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Load from `path`, falling back to defaults (with a warning) when
    /// the file is missing or malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load_from_file(path.as_ref()) {
            Ok(config) => config,
            Err(err) => {
                log::warn!(
                    "decal config {}: {err}; using defaults",
                    path.as_ref().display()
                );
                Self::default()
            }
        }
    }
}

/// Errors that can occur loading or saving a config file.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read or write the file.
    Io(String),
    /// File contents were not valid config JSON.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config io failed: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse failed: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
