//! Deterministic scripted implementation of the `agent_bridge` contract.
//!
//! This crate contains no model or tool logic and is intended for local
//! development and controller-level integration testing.

use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use agent_bridge::{AbortSignal, AgentBridge, BridgeContext, BridgeEvent, BridgeProfile};
use serde_json::{json, Value};

/// Stable bridge identifier used for explicit startup selection.
pub const MOCK_BRIDGE_ID: &str = "mock";

const ABORT_POLL: Duration = Duration::from_millis(5);

/// One scripted step of a mock invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    /// Streamed as whitespace-delimited `text_delta` events.
    Text(String),
    /// A `tool_start`/`tool_end` pair.
    Tool {
        name: String,
        input: Value,
        output: Value,
    },
    Final(String),
    /// An in-band `error` event.
    EmitError(String),
    /// The invocation itself returns an error.
    Fail(String),
    /// Blocks until the abort signal is set.
    WaitForAbort,
    Pause(Duration),
}

impl MockStep {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    #[must_use]
    pub fn tool(name: impl Into<String>, input: Value, output: Value) -> Self {
        Self::Tool {
            name: name.into(),
            input,
            output,
        }
    }
}

/// Bridge that replays a fixed script and records every context it receives.
///
/// With several scripts, invocation `n` replays script `n`; invocations past
/// the last script replay the last one.
#[derive(Debug)]
pub struct ScriptedBridge {
    scripts: Vec<Vec<MockStep>>,
    model_id: String,
    token_delay: Duration,
    invocations: Mutex<Vec<BridgeContext>>,
}

impl ScriptedBridge {
    #[must_use]
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self::with_scripts(vec![steps])
    }

    #[must_use]
    pub fn with_scripts(scripts: Vec<Vec<MockStep>>) -> Self {
        Self {
            scripts,
            model_id: "mock".to_string(),
            token_delay: Duration::ZERO,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps between streamed tokens to imitate a live model.
    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        let trimmed = model_id.trim();
        if !trimmed.is_empty() {
            self.model_id = trimmed.to_string();
        }
        self
    }

    /// Contexts received so far, oldest first.
    #[must_use]
    pub fn invocations(&self) -> Vec<BridgeContext> {
        lock_unpoisoned(&self.invocations).clone()
    }

    #[must_use]
    pub fn invocation_count(&self) -> usize {
        lock_unpoisoned(&self.invocations).len()
    }

    fn stream_text(&self, text: &str, abort: &AbortSignal, emit: &mut dyn FnMut(BridgeEvent)) {
        let mut pending_token = String::new();
        for ch in text.chars() {
            pending_token.push(ch);

            if matches!(ch, ' ' | '\n') {
                if abort.load(Ordering::SeqCst) {
                    return;
                }
                emit(BridgeEvent::TextDelta {
                    text: std::mem::take(&mut pending_token),
                });
                self.pause();
            }
        }

        if !pending_token.is_empty() && !abort.load(Ordering::SeqCst) {
            emit(BridgeEvent::TextDelta {
                text: pending_token,
            });
            self.pause();
        }
    }

    fn pause(&self) {
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
    }
}

impl Default for ScriptedBridge {
    fn default() -> Self {
        Self::new(vec![
            MockStep::text("Checking the connected boards first.\n"),
            MockStep::tool(
                "listBoards",
                json!({}),
                json!("[{\"name\":\"Arduino Uno\",\"fqbn\":\"arduino:avr:uno\"}]"),
            ),
            MockStep::text("Compiling the current sketch.\n"),
            MockStep::tool(
                "compileSketch",
                json!({ "fqbn": "arduino:avr:uno" }),
                json!("Compilation successful."),
            ),
            MockStep::text("The sketch compiles cleanly for the Uno.\n"),
        ])
        .with_token_delay(Duration::from_millis(40))
    }
}

impl AgentBridge for ScriptedBridge {
    fn profile(&self) -> BridgeProfile {
        BridgeProfile::new(MOCK_BRIDGE_ID, self.model_id.clone())
    }

    fn invoke(
        &self,
        context: BridgeContext,
        abort: AbortSignal,
        emit: &mut dyn FnMut(BridgeEvent),
    ) -> Result<(), String> {
        tracing::debug!(
            turn_id = context.turn_id,
            messages = context.messages.len(),
            "mock bridge invoked"
        );
        let steps = {
            let mut invocations = lock_unpoisoned(&self.invocations);
            let index = invocations.len().min(self.scripts.len().saturating_sub(1));
            invocations.push(context);
            self.scripts.get(index).cloned().unwrap_or_default()
        };

        for step in &steps {
            if abort.load(Ordering::SeqCst) {
                return Ok(());
            }

            match step {
                MockStep::Text(text) => self.stream_text(text, &abort, emit),
                MockStep::Tool {
                    name,
                    input,
                    output,
                } => {
                    emit(BridgeEvent::ToolStart {
                        name: name.clone(),
                        input: input.clone(),
                    });
                    self.pause();
                    emit(BridgeEvent::ToolEnd {
                        name: name.clone(),
                        output: output.clone(),
                    });
                }
                MockStep::Final(text) => emit(BridgeEvent::FinalMessage { text: text.clone() }),
                MockStep::EmitError(message) => emit(BridgeEvent::Error {
                    message: message.clone(),
                }),
                MockStep::Fail(message) => return Err(message.clone()),
                MockStep::WaitForAbort => {
                    while !abort.load(Ordering::SeqCst) {
                        thread::sleep(ABORT_POLL);
                    }
                }
                MockStep::Pause(duration) => thread::sleep(*duration),
            }
        }

        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
