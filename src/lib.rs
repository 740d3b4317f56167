//! Session and state layer for an assistant embedded in a sketch editor.
//!
//! [`StreamController`] runs one cancellable streaming turn at a time against
//! an [`agent_bridge::AgentBridge`], snapshots the edited sketch through
//! `checkpoint_store`, and persists the full and replayable transcripts
//! through `transcript_store`. UI-facing events go to a [`GuiHost`].

use std::sync::{Mutex, MutexGuard};

pub mod config;
pub mod context;
pub mod controller;
pub mod credentials;
pub mod events;
pub mod logging;
pub mod tracker;

pub use config::SessionConfig;
pub use context::TargetSelection;
pub use controller::{
    StreamController, TurnOutcome, TurnRequest, TurnState, CANCELLED_MARKER, GENERIC_FAILURE,
};
pub use credentials::{CredentialCache, CredentialError};
pub use events::{GuiHost, UiEvent};
pub use logging::{init_logging, LogFormat};
pub use tracker::{ToolCallTracker, TrackedToolEvent};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
