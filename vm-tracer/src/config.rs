//! Engine configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a coverage session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Directory receiving the session log and script artifacts
    pub output_dir: PathBuf,
}

impl CoverageConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(".coverage"),
        }
    }
}

/// Configuration for a trace session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Emit a storage record per deployed contract after each trace step
    pub capture_storage: bool,
}

impl TraceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            capture_storage: true,
        }
    }
}
