//! Per-thread chat transcripts persisted twice: a full transcript for display
//! and a filtered transcript that is always valid to replay into a model.

mod entry;
mod error;
mod filter;
mod paths;
mod store;

pub use entry::{messages_of, TranscriptEntry};
pub use error::TranscriptStoreError;
pub use filter::filter_replayable;
pub use paths::{chat_dir, filtered_file_name, full_file_name, validate_thread_id, CHAT_DIR};
pub use store::{new_thread_id, TranscriptStore, TranscriptVariant};
