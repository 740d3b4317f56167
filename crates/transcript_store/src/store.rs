use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use agent_bridge::ChatMessage;
use serde_json::Value;

use crate::entry::{messages_of, TranscriptEntry};
use crate::error::TranscriptStoreError;
use crate::filter::filter_replayable;
use crate::paths::{
    chat_dir, filtered_file_name, full_file_name, thread_id_from_file_name, validate_thread_id,
};

/// Which of a thread's two transcripts to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptVariant {
    /// Every message, for display.
    Full,
    /// The replayable subset handed back to the model.
    Filtered,
}

/// Transcript files for one project directory.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    chat_dir: PathBuf,
}

/// Fresh random thread id.
#[must_use]
pub fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl TranscriptStore {
    #[must_use]
    pub fn for_project(project_dir: &Path) -> Self {
        Self {
            chat_dir: chat_dir(project_dir),
        }
    }

    #[must_use]
    pub fn chat_dir(&self) -> &Path {
        &self.chat_dir
    }

    /// Loads one variant of a thread's transcript.
    ///
    /// A missing or unparsable file reads as an empty transcript; individual
    /// unparsable entries are skipped.
    pub fn load(
        &self,
        thread_id: &str,
        variant: TranscriptVariant,
    ) -> Result<Vec<ChatMessage>, TranscriptStoreError> {
        validate_thread_id(thread_id)?;
        let path = self.variant_path(thread_id, variant);
        Ok(messages_of(&read_entries(&path)))
    }

    pub fn load_full(&self, thread_id: &str) -> Result<Vec<ChatMessage>, TranscriptStoreError> {
        self.load(thread_id, TranscriptVariant::Full)
    }

    pub fn load_filtered(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ChatMessage>, TranscriptStoreError> {
        self.load(thread_id, TranscriptVariant::Filtered)
    }

    /// Loads the full transcript including records this version cannot parse,
    /// so it can be extended and saved without losing them.
    pub fn load_full_entries(
        &self,
        thread_id: &str,
    ) -> Result<Vec<TranscriptEntry>, TranscriptStoreError> {
        validate_thread_id(thread_id)?;
        Ok(read_entries(&self.variant_path(thread_id, TranscriptVariant::Full)))
    }

    /// Persists the full transcript and the filtered transcript derived from it.
    pub fn save(
        &self,
        thread_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), TranscriptStoreError> {
        let entries: Vec<TranscriptEntry> =
            messages.iter().cloned().map(TranscriptEntry::from).collect();
        self.save_entries(thread_id, &entries)
    }

    /// Persists `entries` verbatim as the full transcript. Unrecognized
    /// records never reach the filtered transcript.
    pub fn save_entries(
        &self,
        thread_id: &str,
        entries: &[TranscriptEntry],
    ) -> Result<(), TranscriptStoreError> {
        validate_thread_id(thread_id)?;
        fs::create_dir_all(&self.chat_dir).map_err(|source| {
            TranscriptStoreError::io("creating chat directory", &self.chat_dir, source)
        })?;

        let filtered: Vec<TranscriptEntry> = filter_replayable(&messages_of(entries))
            .into_iter()
            .map(TranscriptEntry::from)
            .collect();
        write_entries(&self.variant_path(thread_id, TranscriptVariant::Filtered), &filtered)?;
        write_entries(&self.variant_path(thread_id, TranscriptVariant::Full), entries)?;

        tracing::debug!(
            thread_id,
            full = entries.len(),
            filtered = filtered.len(),
            "saved transcripts"
        );
        Ok(())
    }

    /// Thread ids with a saved transcript, sorted.
    pub fn list_threads(&self) -> Result<Vec<String>, TranscriptStoreError> {
        let read_dir = match fs::read_dir(&self.chat_dir) {
            Ok(read_dir) => read_dir,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(TranscriptStoreError::io(
                    "listing chat directory",
                    &self.chat_dir,
                    source,
                ));
            }
        };

        let mut thread_ids: Vec<String> = read_dir
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let file_name = entry.file_name().into_string().ok()?;
                thread_id_from_file_name(&file_name).map(str::to_string)
            })
            .collect();
        thread_ids.sort();
        Ok(thread_ids)
    }

    /// Removes both transcripts of a thread. Returns whether any file existed.
    pub fn delete_thread(&self, thread_id: &str) -> Result<bool, TranscriptStoreError> {
        validate_thread_id(thread_id)?;

        let mut removed = false;
        for variant in [TranscriptVariant::Filtered, TranscriptVariant::Full] {
            let path = self.variant_path(thread_id, variant);
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(source) if source.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(TranscriptStoreError::io("deleting transcript", &path, source));
                }
            }
        }

        if removed {
            tracing::info!(thread_id, "deleted thread transcripts");
        }
        Ok(removed)
    }

    fn variant_path(&self, thread_id: &str, variant: TranscriptVariant) -> PathBuf {
        match variant {
            TranscriptVariant::Full => self.chat_dir.join(full_file_name(thread_id)),
            TranscriptVariant::Filtered => self.chat_dir.join(filtered_file_name(thread_id)),
        }
    }
}

fn read_entries(path: &Path) -> Vec<TranscriptEntry> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                %error,
                "cannot read transcript, treating as empty"
            );
            return Vec::new();
        }
    };

    let values = match serde_json::from_str::<Vec<Value>>(&raw) {
        Ok(values) => values,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "corrupt transcript, treating as empty");
            return Vec::new();
        }
    };

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let entry = TranscriptEntry::from_value(value);
            if entry.as_message().is_none() {
                tracing::warn!(
                    path = %path.display(),
                    index,
                    "unrecognized transcript entry, keeping it verbatim"
                );
            }
            entry
        })
        .collect()
}

fn write_entries(path: &Path, entries: &[TranscriptEntry]) -> Result<(), TranscriptStoreError> {
    let values = entries
        .iter()
        .map(TranscriptEntry::to_value)
        .collect::<Result<Vec<Value>, _>>()
        .map_err(|source| TranscriptStoreError::json_serialize(path, source))?;
    let serialized = serde_json::to_string_pretty(&values)
        .map_err(|source| TranscriptStoreError::json_serialize(path, source))?;
    fs::write(path, serialized)
        .map_err(|source| TranscriptStoreError::io("writing transcript", path, source))
}
