//! Content-deduplicated, monotonically versioned snapshots of an edited
//! artifact, kept in a `.versions` directory beside it.

mod error;
mod paths;
mod schema;
mod store;

pub use error::CheckpointError;
pub use paths::{
    index_path, main_artifact_path, snapshot_file_name, versions_dir, INDEX_FILE_NAME,
    VERSIONS_DIR_NAME,
};
pub use schema::{CheckpointEntry, SavedCheckpoint};
pub use store::{save_checkpoint, CheckpointStore};
