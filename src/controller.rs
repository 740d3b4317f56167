//! Turn lifecycle: single-flight sessions, cancellation, and event aggregation.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use agent_bridge::{
    new_abort_signal, AbortSignal, AgentBridge, Attachment, BridgeContext, BridgeEvent,
    ChatMessage, EventStream, StreamItem, StreamWaker, TurnId, UserMessage,
};
use checkpoint_store::{main_artifact_path, save_checkpoint};
use transcript_store::{TranscriptEntry, TranscriptStore};

use crate::config::SessionConfig;
use crate::context::{context_preamble, sketch_content, with_preamble, TargetSelection};
use crate::credentials::{CredentialCache, CredentialError};
use crate::events::{console_text_for, GuiHost, UiEvent};
use crate::lock_unpoisoned;
use crate::tracker::ToolCallTracker;

/// System marker persisted in place of a cancelled turn's partial answer.
pub const CANCELLED_MARKER: &str = "Stream cancelled by user.";

/// Error text used when a failure carries no usable message.
pub const GENERIC_FAILURE: &str = "The assistant stopped unexpectedly. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub project_dir: PathBuf,
    pub thread_id: String,
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl TurnRequest {
    #[must_use]
    pub fn new(
        project_dir: impl Into<PathBuf>,
        thread_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            project_dir: project_dir.into(),
            thread_id: thread_id.into(),
            text: text.into(),
            attachment: None,
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Preparing,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { turn_id: TurnId, text: String },
    Cancelled { turn_id: TurnId },
    Failed { turn_id: TurnId, message: String },
}

impl TurnOutcome {
    #[must_use]
    pub fn turn_id(&self) -> TurnId {
        match self {
            Self::Completed { turn_id, .. }
            | Self::Cancelled { turn_id }
            | Self::Failed { turn_id, .. } => *turn_id,
        }
    }
}

/// Released once a turn has persisted its outcome and left the live slot.
#[derive(Debug, Default)]
struct TeardownLatch {
    released: Mutex<bool>,
    signal: Condvar,
}

impl TeardownLatch {
    fn release(&self) {
        *lock_unpoisoned(&self.released) = true;
        self.signal.notify_all();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let released = lock_unpoisoned(&self.released);
        match self
            .signal
            .wait_timeout_while(released, timeout, |released| !*released)
        {
            Ok((released, _)) => *released,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

struct LiveSession {
    turn_id: TurnId,
    abort: AbortSignal,
    state: TurnState,
    waker: Option<StreamWaker>,
    teardown: Arc<TeardownLatch>,
}

impl LiveSession {
    fn signal_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
        if let Some(waker) = &self.waker {
            waker.wake();
        }
    }
}

/// Clears the live slot and releases the teardown latch however a turn ends.
struct SessionGuard<'a> {
    controller: &'a StreamController,
    turn_id: TurnId,
    teardown: Arc<TeardownLatch>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.controller.clear_session_if_matching(self.turn_id);
        self.teardown.release();
    }
}

/// Owns the single live streaming session of the process.
pub struct StreamController {
    config: SessionConfig,
    bridge: Arc<dyn AgentBridge>,
    host: Arc<dyn GuiHost>,
    credentials: CredentialCache,
    selection: Mutex<TargetSelection>,
    current: Mutex<Option<LiveSession>>,
    next_turn_id: AtomicU64,
}

impl StreamController {
    pub fn new(
        config: SessionConfig,
        bridge: Arc<dyn AgentBridge>,
        host: Arc<dyn GuiHost>,
    ) -> Arc<Self> {
        let credentials =
            CredentialCache::new(config.credential_pre_expiry, config.credential_min_lifetime);
        Arc::new(Self {
            config,
            bridge,
            host,
            credentials,
            selection: Mutex::new(TargetSelection::default()),
            current: Mutex::new(None),
            next_turn_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs one turn to its terminal state on the calling thread.
    ///
    /// A turn already in flight is aborted first; this turn waits (bounded by
    /// `supersede_wait`) for it to persist its cancellation before loading
    /// transcripts.
    pub fn run_turn(&self, request: TurnRequest) -> TurnOutcome {
        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        let span = tracing::info_span!("turn", turn_id, thread_id = %request.thread_id);
        let _entered = span.enter();

        let abort = new_abort_signal();
        let teardown = Arc::new(TeardownLatch::default());
        let superseded = self.install_session(turn_id, Arc::clone(&abort), Arc::clone(&teardown));
        let _guard = SessionGuard {
            controller: self,
            turn_id,
            teardown,
        };

        if let Some(previous) = superseded {
            if !previous.wait(self.config.supersede_wait) {
                tracing::warn!(
                    wait_ms = self.config.supersede_wait.as_millis() as u64,
                    "superseded turn did not finish teardown in time"
                );
            }
        }

        let outcome = self.drive_turn(turn_id, &request, &abort);
        tracing::info!(outcome = ?outcome_state(&outcome), "turn finished");
        outcome
    }

    /// Runs a turn on a dedicated worker thread.
    pub fn start_turn(
        self: &Arc<Self>,
        request: TurnRequest,
    ) -> io::Result<JoinHandle<TurnOutcome>> {
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name("embedr-turn".to_string())
            .spawn(move || controller.run_turn(request))
    }

    /// Signals the live session to stop. Returns `false` when none is live.
    ///
    /// Teardown happens on the turn's own thread; this call never blocks on it.
    pub fn cancel(&self) -> bool {
        let current = self.lock_current();
        let Some(session) = current.as_ref() else {
            tracing::debug!("cancel requested with no live session");
            return false;
        };

        tracing::info!(turn_id = session.turn_id, "cancel requested");
        session.signal_abort();
        drop(current);
        self.credentials.wake_waiters();
        true
    }

    #[must_use]
    pub fn state(&self) -> TurnState {
        self.lock_current()
            .as_ref()
            .map_or(TurnState::Idle, |session| session.state)
    }

    /// Turn id of the live session, if any.
    #[must_use]
    pub fn live_turn_id(&self) -> Option<TurnId> {
        self.lock_current().as_ref().map(|session| session.turn_id)
    }

    pub fn set_credential(
        &self,
        token: &str,
        expires_at: SystemTime,
    ) -> Result<(), CredentialError> {
        self.credentials.set(token, expires_at)
    }

    pub fn clear_credential(&self) {
        self.credentials.clear();
    }

    pub fn set_board(&self, fqbn: Option<String>) {
        lock_unpoisoned(&self.selection).board_fqbn = fqbn.filter(|fqbn| !fqbn.trim().is_empty());
    }

    /// Replaces all board options.
    pub fn set_board_options(&self, options: impl IntoIterator<Item = (String, String)>) {
        lock_unpoisoned(&self.selection).board_options = options.into_iter().collect();
    }

    pub fn set_board_option(&self, key: impl Into<String>, value: impl Into<String>) {
        lock_unpoisoned(&self.selection)
            .board_options
            .insert(key.into(), value.into());
    }

    pub fn set_port(&self, port: Option<String>) {
        lock_unpoisoned(&self.selection).port = port.filter(|port| !port.trim().is_empty());
    }

    #[must_use]
    pub fn selection(&self) -> TargetSelection {
        lock_unpoisoned(&self.selection).clone()
    }

    fn drive_turn(
        &self,
        turn_id: TurnId,
        request: &TurnRequest,
        abort: &AbortSignal,
    ) -> TurnOutcome {
        let artifact = main_artifact_path(&request.project_dir);
        let checkpoint = artifact.as_deref().and_then(|artifact| match save_checkpoint(artifact) {
            Ok(saved) => {
                tracing::debug!(
                    version = saved.version,
                    no_changes = saved.no_changes,
                    "checkpoint ready"
                );
                Some(saved.version_path)
            }
            Err(error) => {
                tracing::error!(%error, "checkpoint failed, continuing without one");
                None
            }
        });

        let store = TranscriptStore::for_project(&request.project_dir);
        let user_message = ChatMessage::User(UserMessage {
            content: request.text.clone(),
            attachment: request.attachment.clone(),
            checkpoint_path: checkpoint.as_ref().map(|path| path.display().to_string()),
        });
        let mut run = TurnRun {
            controller: self,
            turn_id,
            thread_id: &request.thread_id,
            store,
            prior_full: Vec::new(),
            run_messages: vec![user_message.clone()],
        };

        let (prior_full, prior_filtered) = match (
            run.store.load_full_entries(&request.thread_id),
            run.store.load_filtered(&request.thread_id),
        ) {
            (Ok(full), Ok(filtered)) => (full, filtered),
            (Err(error), _) | (_, Err(error)) => {
                return run.fail_unpersisted(error.to_string());
            }
        };
        tracing::debug!(
            full = prior_full.len(),
            filtered = prior_filtered.len(),
            "loaded transcripts"
        );
        run.prior_full = prior_full;

        let credential = match self.acquire_credential(abort) {
            Ok(credential) => credential,
            Err(CredentialError::Aborted) => return run.cancel(),
            Err(error) => return run.fail(error.to_string()),
        };

        let preamble = context_preamble(
            &request.project_dir,
            artifact.as_deref(),
            &self.selection(),
            &sketch_content(checkpoint.as_deref(), artifact.as_deref()),
        );
        let mut messages = prior_filtered;
        messages.push(with_preamble(&user_message, &preamble));
        let context = BridgeContext {
            turn_id,
            instructions: self.config.system_instructions.clone(),
            messages,
            credential,
        };

        if abort.load(Ordering::SeqCst) {
            return run.cancel();
        }
        self.set_state(turn_id, TurnState::Streaming);
        let spawned = EventStream::spawn(Arc::clone(&self.bridge), context, Arc::clone(abort));
        let stream = match spawned {
            Ok(stream) => stream,
            Err(error) => return run.fail(format!("Failed to start agent bridge: {error}")),
        };
        self.register_waker(turn_id, stream.waker());

        self.consume_stream(&mut run, &stream, abort)
    }

    fn consume_stream(
        &self,
        run: &mut TurnRun<'_>,
        stream: &EventStream,
        abort: &AbortSignal,
    ) -> TurnOutcome {
        let turn_id = run.turn_id;
        let mut tracker = ToolCallTracker::new();
        let mut accumulated = String::new();
        let mut final_text: Option<String> = None;
        let mut failure: Option<String> = None;

        loop {
            if abort.load(Ordering::SeqCst) {
                break;
            }

            let event = match stream.next() {
                StreamItem::Woken => continue,
                StreamItem::Finished(Ok(())) => break,
                StreamItem::Finished(Err(error)) => {
                    failure = Some(error);
                    break;
                }
                StreamItem::Event(event) => event,
            };
            if abort.load(Ordering::SeqCst) {
                break;
            }
            tracing::debug!(kind = event.kind(), "bridge event");
            let ends_stream = event.ends_stream();

            match event {
                BridgeEvent::TextDelta { text } => {
                    accumulated.push_str(&text);
                    self.host.emit(turn_id, UiEvent::ChunkDelta { delta: text });
                }
                BridgeEvent::ToolStart { name, input } => {
                    let tracked = tracker.start(&name, &input);
                    run.run_messages.push(tracked.message);
                    self.host.emit(
                        turn_id,
                        UiEvent::ToolStart {
                            tool_call_id: tracked.tool_call_id,
                            name,
                            input,
                        },
                    );
                }
                BridgeEvent::ToolEnd { name, output } => {
                    let tracked = tracker.end(&name, &output);
                    run.run_messages.push(tracked.message);
                    let console = self
                        .config
                        .is_console_tool(&name)
                        .then(|| console_text_for(&name, &output))
                        .flatten();
                    self.host.emit(
                        turn_id,
                        UiEvent::ToolEnd {
                            tool_call_id: tracked.tool_call_id,
                            name: name.clone(),
                            output,
                        },
                    );
                    if let Some(text) = console {
                        self.host.emit(turn_id, UiEvent::ConsoleOutput { name, text });
                    }
                }
                BridgeEvent::FinalMessage { text } => final_text = Some(text),
                BridgeEvent::Error { message } => failure = Some(message),
            }
            if ends_stream {
                break;
            }
        }

        if tracker.open_calls() > 0 {
            tracing::debug!(open = tracker.open_calls(), "turn ended with unfinished tool calls");
        }

        if abort.load(Ordering::SeqCst) {
            run.cancel()
        } else if let Some(error) = failure {
            run.fail(error)
        } else {
            run.complete(final_text.unwrap_or(accumulated))
        }
    }

    fn acquire_credential(&self, abort: &AbortSignal) -> Result<String, CredentialError> {
        if let Some(credential) = self.credentials.current() {
            return Ok(credential);
        }

        tracing::info!("no cached credential, requesting one from the GUI");
        self.host.request_credential();
        let result = self
            .credentials
            .wait_for(self.config.credential_timeout, abort);
        if let Err(CredentialError::TimedOut { waited }) = &result {
            tracing::error!(waited_ms = waited.as_millis() as u64, "credential wait timed out");
        }
        result
    }

    /// Makes `turn_id` the live session, aborting any previous one. Returns
    /// the previous session's teardown latch.
    fn install_session(
        &self,
        turn_id: TurnId,
        abort: AbortSignal,
        teardown: Arc<TeardownLatch>,
    ) -> Option<Arc<TeardownLatch>> {
        let mut current = self.lock_current();
        let previous = current.take().map(|previous| {
            tracing::info!(previous_turn_id = previous.turn_id, "aborting superseded turn");
            previous.signal_abort();
            previous.teardown
        });
        *current = Some(LiveSession {
            turn_id,
            abort,
            state: TurnState::Preparing,
            waker: None,
            teardown,
        });
        drop(current);

        if previous.is_some() {
            self.credentials.wake_waiters();
        }
        previous
    }

    fn register_waker(&self, turn_id: TurnId, waker: StreamWaker) {
        if let Some(session) = self.lock_current().as_mut() {
            if session.turn_id == turn_id {
                session.waker = Some(waker);
            }
        }
    }

    fn set_state(&self, turn_id: TurnId, state: TurnState) {
        if let Some(session) = self.lock_current().as_mut() {
            if session.turn_id == turn_id {
                session.state = state;
            }
        }
    }

    fn clear_session_if_matching(&self, turn_id: TurnId) {
        let mut current = self.lock_current();
        if current.as_ref().map(|session| session.turn_id) == Some(turn_id) {
            *current = None;
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<LiveSession>> {
        lock_unpoisoned(&self.current)
    }
}

/// Messages gathered by one turn and the terminal transitions that persist them.
struct TurnRun<'a> {
    controller: &'a StreamController,
    turn_id: TurnId,
    thread_id: &'a str,
    store: TranscriptStore,
    prior_full: Vec<TranscriptEntry>,
    run_messages: Vec<ChatMessage>,
}

impl TurnRun<'_> {
    fn complete(&mut self, text: String) -> TurnOutcome {
        self.run_messages.push(ChatMessage::assistant(text.clone()));
        self.persist();
        self.finish(TurnState::Completed, UiEvent::Done {
            content: text.clone(),
        });
        TurnOutcome::Completed {
            turn_id: self.turn_id,
            text,
        }
    }

    fn cancel(&mut self) -> TurnOutcome {
        self.run_messages.push(ChatMessage::system(CANCELLED_MARKER));
        self.persist();
        self.finish(TurnState::Cancelled, UiEvent::Cancelled);
        TurnOutcome::Cancelled {
            turn_id: self.turn_id,
        }
    }

    /// Persists gathered progress without inventing a message for the failure.
    fn fail(&mut self, error: String) -> TurnOutcome {
        self.persist();
        self.fail_unpersisted(error)
    }

    fn fail_unpersisted(&mut self, error: String) -> TurnOutcome {
        let message = user_visible_error(&error);
        tracing::error!(error = %message, "turn failed");
        self.finish(TurnState::Failed, UiEvent::Error {
            error: message.clone(),
        });
        TurnOutcome::Failed {
            turn_id: self.turn_id,
            message,
        }
    }

    fn persist(&self) {
        let mut full = self.prior_full.clone();
        full.extend(self.run_messages.iter().cloned().map(TranscriptEntry::from));
        if let Err(error) = self.store.save_entries(self.thread_id, &full) {
            tracing::error!(%error, "failed to persist transcripts");
        }
    }

    fn finish(&self, state: TurnState, event: UiEvent) {
        self.controller.set_state(self.turn_id, state);
        self.controller.host.emit(self.turn_id, event);
    }
}

/// Never blank: falls back to a generic diagnostic.
#[must_use]
pub fn user_visible_error(error: &str) -> String {
    let trimmed = error.trim();
    if trimmed.is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        trimmed.to_string()
    }
}

fn outcome_state(outcome: &TurnOutcome) -> TurnState {
    match outcome {
        TurnOutcome::Completed { .. } => TurnState::Completed,
        TurnOutcome::Cancelled { .. } => TurnState::Cancelled,
        TurnOutcome::Failed { .. } => TurnState::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_errors_get_generic_diagnostic() {
        assert_eq!(user_visible_error(""), GENERIC_FAILURE);
        assert_eq!(user_visible_error("  \n"), GENERIC_FAILURE);
        assert_eq!(user_visible_error(" model offline "), "model offline");
    }

    #[test]
    fn teardown_latch_wait_is_bounded() {
        let latch = TeardownLatch::default();
        assert!(!latch.wait(Duration::from_millis(10)));
        latch.release();
        assert!(latch.wait(Duration::from_millis(10)));
    }

    #[test]
    fn turn_request_builder_sets_attachment() {
        let request = TurnRequest::new("/work/blink", "t1", "look").with_attachment(
            Attachment::Image {
                data_url: "data:image/png;base64,AA==".to_string(),
            },
        );
        assert!(request.attachment.is_some());
        assert_eq!(request.thread_id, "t1");
    }
}
