//! Correlates tool start/end events into per-invocation call ids.

use std::collections::HashMap;

use agent_bridge::{ChatMessage, ToolMessage, ToolPhase};
use serde_json::Value;

/// A tool event resolved to its call id, with the transcript stub recording it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedToolEvent {
    pub tool_call_id: String,
    pub message: ChatMessage,
}

/// Per-turn tool-call bookkeeping.
///
/// Each start mints a fresh id; an end resolves the most recent unfinished id
/// for the same tool name, so nested or repeated calls never share an id.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    open: HashMap<String, Vec<String>>,
}

impl ToolCallTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, name: &str, input: &Value) -> TrackedToolEvent {
        let tool_call_id = mint_id();
        self.open
            .entry(name.to_string())
            .or_default()
            .push(tool_call_id.clone());

        TrackedToolEvent {
            message: ChatMessage::Tool(ToolMessage {
                tool_call_id: tool_call_id.clone(),
                content: format!("Using tool: {name}..."),
                tool_name: Some(name.to_string()),
                phase: Some(ToolPhase::Start),
                tool_input: Some(input.to_string()),
                tool_output: None,
            }),
            tool_call_id,
        }
    }

    pub fn end(&mut self, name: &str, output: &Value) -> TrackedToolEvent {
        let tool_call_id = match self.open.get_mut(name).and_then(Vec::pop) {
            Some(tool_call_id) => tool_call_id,
            None => {
                let tool_call_id = mint_id();
                tracing::warn!(tool = name, %tool_call_id, "tool end without matching start");
                tool_call_id
            }
        };

        TrackedToolEvent {
            message: ChatMessage::Tool(ToolMessage {
                tool_call_id: tool_call_id.clone(),
                content: format!("Tool {name} completed"),
                tool_name: Some(name.to_string()),
                phase: Some(ToolPhase::End),
                tool_input: None,
                tool_output: Some(stored_output(output)),
            }),
            tool_call_id,
        }
    }

    /// Number of started calls still awaiting their end event.
    #[must_use]
    pub fn open_calls(&self) -> usize {
        self.open.values().map(Vec::len).sum()
    }
}

fn mint_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn stored_output(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
