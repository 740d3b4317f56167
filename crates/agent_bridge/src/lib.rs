//! Minimal contract between the session controller and an external
//! model-plus-tools orchestration loop.
//!
//! This crate defines the persisted chat message model, the closed set of
//! events a bridge may emit during one invocation, and the pull-based stream
//! the controller consumes. It excludes any model vendor wire format; tool
//! execution (compiler, flasher, serial transport) happens entirely behind the
//! bridge and surfaces here only as opaque JSON inputs and outputs.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde_json::Value;

mod message;
mod stream;

pub use message::{
    AssistantMessage, Attachment, ChatMessage, Role, SystemMessage, ToolCall, ToolMessage,
    ToolPhase, UserMessage,
};
pub use stream::{EventStream, StreamItem, StreamWaker};

/// Identifier for one user turn.
pub type TurnId = u64;

/// Shared abort flag for one bridge invocation.
pub type AbortSignal = Arc<AtomicBool>;

/// Returns a fresh, unset abort flag.
#[must_use]
pub fn new_abort_signal() -> AbortSignal {
    Arc::new(AtomicBool::new(false))
}

/// Error returned while constructing/configuring a bridge before any turn starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeInitError {
    message: String,
}

impl BridgeInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BridgeInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BridgeInitError {}

impl From<String> for BridgeInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for BridgeInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Assembled input for one bridge invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeContext {
    pub turn_id: TurnId,
    pub instructions: String,
    /// Replay-valid history followed by the new user turn.
    pub messages: Vec<ChatMessage>,
    pub credential: String,
}

/// Event emitted by a bridge while an invocation is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    TextDelta { text: String },
    ToolStart { name: String, input: Value },
    ToolEnd { name: String, output: Value },
    /// Complete model output. Supersedes any accumulated deltas.
    FinalMessage { text: String },
    Error { message: String },
}

impl BridgeEvent {
    /// Stable event name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::FinalMessage { .. } => "final_message",
            Self::Error { .. } => "error",
        }
    }

    /// Returns true when the consumer should stop reading after this event.
    #[must_use]
    pub fn ends_stream(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Immutable metadata describing a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeProfile {
    pub bridge_id: String,
    pub model_id: String,
}

impl BridgeProfile {
    #[must_use]
    pub fn new(bridge_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            model_id: model_id.into(),
        }
    }
}

/// External model/tool orchestration collaborator.
pub trait AgentBridge: Send + Sync + 'static {
    fn profile(&self) -> BridgeProfile;

    /// Runs one invocation, emitting events in order.
    ///
    /// Implementations should poll `abort` between steps and return promptly
    /// once it is set; the caller does not wait for them to do so.
    fn invoke(
        &self,
        context: BridgeContext,
        abort: AbortSignal,
        emit: &mut dyn FnMut(BridgeEvent),
    ) -> Result<(), String>;
}
