//! Pull-based event sequence over one bridge invocation.
//!
//! The bridge runs on a dedicated worker thread and pushes events into a
//! channel; the consumer pulls them in arrival order. A [`StreamWaker`] lets
//! an out-of-band cancel request unblock a consumer parked on
//! [`EventStream::next`] without waiting for the bridge to produce anything.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::{AbortSignal, AgentBridge, BridgeContext, BridgeEvent};

/// One item pulled from an [`EventStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Event(BridgeEvent),
    /// The bridge returned; no further events follow.
    Finished(Result<(), String>),
    /// Produced by [`StreamWaker::wake`].
    Woken,
}

/// Handle that unblocks a consumer waiting on [`EventStream::next`].
#[derive(Debug, Clone)]
pub struct StreamWaker {
    sender: Sender<StreamItem>,
}

impl StreamWaker {
    pub fn wake(&self) {
        let _ = self.sender.send(StreamItem::Woken);
    }
}

#[derive(Debug)]
pub struct EventStream {
    receiver: Receiver<StreamItem>,
    sender: Sender<StreamItem>,
    worker: Option<JoinHandle<()>>,
}

impl EventStream {
    /// Starts `bridge.invoke` on a worker thread.
    pub fn spawn(
        bridge: Arc<dyn AgentBridge>,
        context: BridgeContext,
        abort: AbortSignal,
    ) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let events = sender.clone();
        let turn_id = context.turn_id;

        let worker = thread::Builder::new()
            .name(format!("agent-bridge-turn-{turn_id}"))
            .spawn(move || {
                let mut emit = |event: BridgeEvent| {
                    let _ = events.send(StreamItem::Event(event));
                };
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    bridge.invoke(context, abort, &mut emit)
                }));
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(turn_id, "agent bridge panicked");
                        Err("Agent bridge panicked".to_string())
                    }
                };
                let _ = events.send(StreamItem::Finished(result));
            })?;

        Ok(Self {
            receiver,
            sender,
            worker: Some(worker),
        })
    }

    #[must_use]
    pub fn waker(&self) -> StreamWaker {
        StreamWaker {
            sender: self.sender.clone(),
        }
    }

    /// Blocks until the next item arrives.
    pub fn next(&self) -> StreamItem {
        // The stream holds its own sender, so the channel never disconnects
        // while `self` is alive.
        self.receiver.recv().unwrap_or_else(|_| {
            StreamItem::Finished(Err("Bridge event channel closed".to_string()))
        })
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        // An aborted bridge may still be unwinding; only reap finished workers.
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{new_abort_signal, BridgeProfile};

    struct TwoEventBridge;

    impl AgentBridge for TwoEventBridge {
        fn profile(&self) -> BridgeProfile {
            BridgeProfile::new("two-event", "none")
        }

        fn invoke(
            &self,
            _context: BridgeContext,
            _abort: AbortSignal,
            emit: &mut dyn FnMut(BridgeEvent),
        ) -> Result<(), String> {
            emit(BridgeEvent::TextDelta {
                text: "a".to_string(),
            });
            emit(BridgeEvent::ToolStart {
                name: "listBoards".to_string(),
                input: json!({}),
            });
            Ok(())
        }
    }

    struct PanickingBridge;

    impl AgentBridge for PanickingBridge {
        fn profile(&self) -> BridgeProfile {
            BridgeProfile::new("panicking", "none")
        }

        fn invoke(
            &self,
            _context: BridgeContext,
            _abort: AbortSignal,
            _emit: &mut dyn FnMut(BridgeEvent),
        ) -> Result<(), String> {
            panic!("bridge exploded");
        }
    }

    struct WaitForAbortBridge;

    impl AgentBridge for WaitForAbortBridge {
        fn profile(&self) -> BridgeProfile {
            BridgeProfile::new("waiting", "none")
        }

        fn invoke(
            &self,
            _context: BridgeContext,
            abort: AbortSignal,
            _emit: &mut dyn FnMut(BridgeEvent),
        ) -> Result<(), String> {
            while !abort.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    fn context() -> BridgeContext {
        BridgeContext {
            turn_id: 1,
            instructions: String::new(),
            messages: Vec::new(),
            credential: "token".to_string(),
        }
    }

    #[test]
    fn events_arrive_in_order_then_finish() {
        let stream = EventStream::spawn(Arc::new(TwoEventBridge), context(), new_abort_signal())
            .expect("worker should spawn");

        assert_eq!(
            stream.next(),
            StreamItem::Event(BridgeEvent::TextDelta {
                text: "a".to_string()
            })
        );
        assert!(matches!(
            stream.next(),
            StreamItem::Event(BridgeEvent::ToolStart { .. })
        ));
        assert_eq!(stream.next(), StreamItem::Finished(Ok(())));
    }

    #[test]
    fn bridge_panic_is_reported_as_failure() {
        let stream = EventStream::spawn(Arc::new(PanickingBridge), context(), new_abort_signal())
            .expect("worker should spawn");

        assert_eq!(
            stream.next(),
            StreamItem::Finished(Err("Agent bridge panicked".to_string()))
        );
    }

    #[test]
    fn waker_unblocks_consumer_before_bridge_returns() {
        let abort = new_abort_signal();
        let stream =
            EventStream::spawn(Arc::new(WaitForAbortBridge), context(), Arc::clone(&abort))
                .expect("worker should spawn");

        stream.waker().wake();
        assert_eq!(stream.next(), StreamItem::Woken);

        abort.store(true, Ordering::SeqCst);
        assert_eq!(stream.next(), StreamItem::Finished(Ok(())));
    }
}
