//! Engine configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ipc::DEFAULT_MAX_MESSAGE_SIZE;

/// Target identity a router owns when none are configured.
pub const DEFAULT_LOCAL_TARGET: &str = "local://";

/// Configuration for a [`TargetRouter`](crate::TargetRouter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local targets created at start-up.
    pub targets: Vec<String>,

    /// Per-run charge budget. `None` admits any bounded charge.
    pub charge_limit: Option<u64>,

    /// Largest framed message accepted on a wire.
    pub max_message_size: usize,

    /// Directory for state snapshots.
    pub state_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            targets: vec![DEFAULT_LOCAL_TARGET.to_string()],
            charge_limit: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            state_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}
