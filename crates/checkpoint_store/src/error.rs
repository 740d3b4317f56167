use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("artifact not found: {path}")]
    ArtifactMissing { path: PathBuf },

    #[error("checkpoint snapshot not found: {path}")]
    SnapshotMissing { path: PathBuf },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize checkpoint index for {path}: {source}")]
    IndexSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CheckpointError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn index_serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::IndexSerialize {
            path: path.into(),
            source,
        }
    }
}
