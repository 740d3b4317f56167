use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One record of `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// Stable identifier; never reassigned. Legacy records without one
    /// deserialize as `0`.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub timestamp: String,
    pub path: PathBuf,
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCheckpoint {
    pub version: u64,
    pub version_path: PathBuf,
    /// The artifact matched the newest snapshot; nothing was written.
    pub no_changes: bool,
}
