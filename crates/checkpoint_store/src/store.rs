use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::error::CheckpointError;
use crate::paths::{
    artifact_extension, index_path, snapshot_file_name, snapshot_stamp, versions_dir,
    INDEX_FILE_NAME,
};
use crate::schema::{CheckpointEntry, SavedCheckpoint};

/// Version index and snapshots for one artifact.
///
/// The index is kept newest-first. Versions are assigned as
/// `max(existing) + 1` and are never renumbered, so they stay valid
/// identifiers across deletions.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    artifact_path: PathBuf,
    versions_dir: PathBuf,
    extension: String,
}

/// Snapshots `artifact_path` into its sibling `.versions` directory.
pub fn save_checkpoint(artifact_path: &Path) -> Result<SavedCheckpoint, CheckpointError> {
    CheckpointStore::for_artifact(artifact_path).save()
}

impl CheckpointStore {
    #[must_use]
    pub fn for_artifact(artifact_path: impl Into<PathBuf>) -> Self {
        let artifact_path = artifact_path.into();
        let versions_dir = versions_dir(&artifact_path);
        let extension = artifact_extension(&artifact_path);
        Self {
            artifact_path,
            versions_dir,
            extension,
        }
    }

    #[must_use]
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    #[must_use]
    pub fn versions_dir(&self) -> &Path {
        &self.versions_dir
    }

    /// Takes a checkpoint, reusing the newest one when the artifact bytes are
    /// unchanged.
    pub fn save(&self) -> Result<SavedCheckpoint, CheckpointError> {
        let current = match fs::read(&self.artifact_path) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                return Err(CheckpointError::ArtifactMissing {
                    path: self.artifact_path.clone(),
                });
            }
            Err(source) => {
                return Err(CheckpointError::io(
                    "reading artifact",
                    &self.artifact_path,
                    source,
                ));
            }
        };

        fs::create_dir_all(&self.versions_dir).map_err(|source| {
            CheckpointError::io("creating versions directory", &self.versions_dir, source)
        })?;

        let mut entries = self.read_index();
        if let Some(newest) = entries.first() {
            match fs::read(&newest.path) {
                Ok(previous) if previous == current => {
                    tracing::info!(
                        artifact = %self.artifact_path.display(),
                        version = newest.version,
                        "artifact unchanged, reusing newest checkpoint"
                    );
                    return Ok(SavedCheckpoint {
                        version: newest.version,
                        version_path: newest.path.clone(),
                        no_changes: true,
                    });
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(
                    snapshot = %newest.path.display(),
                    %error,
                    "cannot read newest snapshot, taking a fresh checkpoint"
                ),
            }
        }

        let stamp = snapshot_stamp(OffsetDateTime::now_utc());
        let (filename, snapshot_path) = self.unused_snapshot_path(&stamp);
        fs::write(&snapshot_path, &current)
            .map_err(|source| CheckpointError::io("writing snapshot", &snapshot_path, source))?;

        let version = next_version(&entries);
        entries.insert(
            0,
            CheckpointEntry {
                version,
                filename,
                timestamp: stamp,
                path: snapshot_path.clone(),
            },
        );
        self.write_index(&entries)?;

        tracing::info!(
            artifact = %self.artifact_path.display(),
            version,
            snapshot = %snapshot_path.display(),
            "created checkpoint"
        );

        Ok(SavedCheckpoint {
            version,
            version_path: snapshot_path,
            no_changes: false,
        })
    }

    /// Lists checkpoints newest-first, rebuilding the index from snapshot
    /// filenames when it is missing, empty, or predates version numbers.
    pub fn list(&self) -> Result<Vec<CheckpointEntry>, CheckpointError> {
        if !self.versions_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = self.read_index();
        if entries.first().map_or(true, |newest| newest.version == 0) {
            tracing::info!(
                versions_dir = %self.versions_dir.display(),
                "migrating checkpoint index"
            );
            entries = self.rebuild_index()?;
            self.write_index(&entries)?;
        }

        entries.sort_by(|left, right| right.version.cmp(&left.version));
        Ok(entries)
    }

    /// Reads a snapshot's content.
    pub fn read(&self, version_path: &Path) -> Result<String, CheckpointError> {
        fs::read_to_string(version_path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                CheckpointError::SnapshotMissing {
                    path: version_path.to_path_buf(),
                }
            } else {
                CheckpointError::io("reading snapshot", version_path, source)
            }
        })
    }

    /// Deletes a snapshot and its index record, matched by path or filename.
    ///
    /// `version_path` may be the snapshot's full path or its bare filename;
    /// either way only files directly inside the versions directory are
    /// removed. Remaining versions keep their numbers. Returns whether an
    /// index record was removed.
    pub fn delete(&self, version_path: &Path) -> Result<bool, CheckpointError> {
        let Some(file_name) = version_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(false);
        };
        if file_name == INDEX_FILE_NAME {
            return Ok(false);
        }

        let index_path = index_path(&self.versions_dir);
        let entries = match fs::read_to_string(&index_path) {
            Ok(raw) => match serde_json::from_str::<Vec<CheckpointEntry>>(&raw) {
                Ok(entries) => Some(entries),
                Err(error) => {
                    tracing::warn!(
                        index = %index_path.display(),
                        %error,
                        "checkpoint index unreadable, leaving it untouched after delete"
                    );
                    None
                }
            },
            Err(source) if source.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                return Err(CheckpointError::io("reading checkpoint index", &index_path, source));
            }
        };

        let Some(entries) = entries else {
            self.remove_snapshot(&self.versions_dir.join(file_name))?;
            return Ok(false);
        };

        let (removed, kept): (Vec<CheckpointEntry>, Vec<CheckpointEntry>) = entries
            .into_iter()
            .partition(|entry| entry.path == version_path || entry.filename == file_name);

        if removed.is_empty() {
            self.remove_snapshot(&self.versions_dir.join(file_name))?;
            return Ok(false);
        }
        for entry in &removed {
            self.remove_snapshot(&self.snapshot_path_of(entry))?;
        }
        self.write_index(&kept)?;

        tracing::info!(
            artifact = %self.artifact_path.display(),
            versions = ?removed.iter().map(|entry| entry.version).collect::<Vec<_>>(),
            "deleted checkpoint"
        );
        Ok(true)
    }

    /// Overwrites the artifact with a snapshot and returns the restored content.
    pub fn restore(&self, checkpoint_path: &Path) -> Result<String, CheckpointError> {
        if !checkpoint_path.is_file() {
            return Err(CheckpointError::SnapshotMissing {
                path: checkpoint_path.to_path_buf(),
            });
        }

        let content = self.read(checkpoint_path)?;
        fs::write(&self.artifact_path, &content).map_err(|source| {
            CheckpointError::io("restoring artifact", &self.artifact_path, source)
        })?;

        tracing::info!(
            artifact = %self.artifact_path.display(),
            snapshot = %checkpoint_path.display(),
            "restored checkpoint"
        );
        Ok(content)
    }

    /// Missing, unreadable, or malformed indexes read as empty.
    fn read_index(&self) -> Vec<CheckpointEntry> {
        let index_path = index_path(&self.versions_dir);
        let raw = match fs::read_to_string(&index_path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(error) => {
                tracing::warn!(
                    index = %index_path.display(),
                    %error,
                    "cannot read checkpoint index"
                );
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    index = %index_path.display(),
                    %error,
                    "corrupt checkpoint index, treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn write_index(&self, entries: &[CheckpointEntry]) -> Result<(), CheckpointError> {
        let index_path = index_path(&self.versions_dir);
        let serialized = serde_json::to_string_pretty(entries)
            .map_err(|source| CheckpointError::index_serialize(&index_path, source))?;
        fs::write(&index_path, serialized)
            .map_err(|source| CheckpointError::io("writing checkpoint index", &index_path, source))
    }

    /// Oldest snapshot filename gets version 1.
    fn rebuild_index(&self) -> Result<Vec<CheckpointEntry>, CheckpointError> {
        let read_dir = fs::read_dir(&self.versions_dir).map_err(|source| {
            CheckpointError::io("scanning versions directory", &self.versions_dir, source)
        })?;

        let mut file_names: Vec<String> = read_dir
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                Path::new(name).extension().and_then(|extension| extension.to_str())
                    == Some(self.extension.as_str())
            })
            .collect();
        file_names.sort();

        let total = file_names.len() as u64;
        Ok(file_names
            .into_iter()
            .rev()
            .enumerate()
            .map(|(newest_offset, filename)| {
                let timestamp = filename
                    .strip_suffix(&format!(".{}", self.extension))
                    .unwrap_or(&filename)
                    .to_string();
                CheckpointEntry {
                    version: total - newest_offset as u64,
                    path: self.versions_dir.join(&filename),
                    filename,
                    timestamp,
                }
            })
            .collect())
    }

    /// On-disk location of an indexed snapshot, always inside the versions
    /// directory.
    fn snapshot_path_of(&self, entry: &CheckpointEntry) -> PathBuf {
        let file_name = if entry.filename.is_empty() {
            entry
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            entry.filename.clone()
        };
        self.versions_dir.join(file_name)
    }

    fn remove_snapshot(&self, snapshot_path: &Path) -> Result<(), CheckpointError> {
        if snapshot_path == self.versions_dir {
            return Ok(());
        }
        match fs::remove_file(snapshot_path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::io("deleting snapshot", snapshot_path, source)),
        }
    }

    fn unused_snapshot_path(&self, stamp: &str) -> (String, PathBuf) {
        let mut filename = snapshot_file_name(stamp, &self.extension);
        let mut suffix = 1u32;
        while self.versions_dir.join(&filename).exists() {
            filename = snapshot_file_name(&format!("{stamp}_{suffix}"), &self.extension);
            suffix += 1;
        }
        let path = self.versions_dir.join(&filename);
        (filename, path)
    }
}

fn next_version(entries: &[CheckpointEntry]) -> u64 {
    entries
        .iter()
        .map(|entry| entry.version)
        .max()
        .unwrap_or(0)
        + 1
}
