use std::path::{Path, PathBuf};

use crate::error::TranscriptStoreError;

pub const CHAT_DIR: &str = ".embedr_chat";
const FULL_SUFFIX: &str = ".full.json";
const FILTERED_SUFFIX: &str = ".json";

#[must_use]
pub fn chat_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(CHAT_DIR)
}

#[must_use]
pub fn filtered_file_name(thread_id: &str) -> String {
    format!("{thread_id}{FILTERED_SUFFIX}")
}

#[must_use]
pub fn full_file_name(thread_id: &str) -> String {
    format!("{thread_id}{FULL_SUFFIX}")
}

/// Thread ids become file names, so they must not escape the chat directory.
pub fn validate_thread_id(thread_id: &str) -> Result<(), TranscriptStoreError> {
    let reason = if thread_id.trim().is_empty() {
        Some("must not be blank")
    } else if thread_id.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if thread_id.contains("..") {
        Some("must not contain '..'")
    } else if thread_id.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(TranscriptStoreError::InvalidThreadId {
            thread_id: thread_id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Thread id of a filtered transcript file name; `None` for full transcripts
/// and unrelated files.
pub(crate) fn thread_id_from_file_name(file_name: &str) -> Option<&str> {
    if file_name.ends_with(FULL_SUFFIX) {
        return None;
    }
    file_name
        .strip_suffix(FILTERED_SUFFIX)
        .filter(|thread_id| !thread_id.is_empty())
}
