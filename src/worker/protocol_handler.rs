//! Protocol Handler
//!
//! Per-session state machine driven by inbound `type` values:
//!
//! ```text
//! Unregistered -> AwaitingReady -> Ready -> Busy -> Ready -> ...
//!        ^                                                |
//!        +------------------- disconnect -----------------+
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::executor::TaskExecutor;
use crate::protocol::{ClientMessage, ConnectedMessage, ServerMessage, TaskEnvelope};
use crate::transport::Outbox;

use super::SharedState;

/// Error text for a task that arrives before registration completes
pub const NOT_READY_ERROR: &str = "Worker not ready";

/// Registration / work state of one session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProtocolState {
    /// Waiting for the server's `connected` message
    #[default]
    Unregistered,
    /// Identity recorded, `ready` not yet sent
    AwaitingReady,
    /// Idle and accepting work
    Ready,
    /// Executing a task
    Busy { task_id: String },
}

/// Report produced by a finished task run
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFinished {
    pub task_id: String,
    pub report: ClientMessage,
}

/// Handles inbound messages for one session
pub struct ProtocolHandler {
    state: ProtocolState,
    shared: SharedState,
    outbox: Outbox,
    executor: Arc<TaskExecutor>,
    finished_tx: mpsc::UnboundedSender<TaskFinished>,
}

impl ProtocolHandler {
    /// Create a handler and the receiver for finished task reports
    ///
    /// Reports must be fed back through [`ProtocolHandler::task_finished`]
    /// by the context that owns the session.
    pub fn new(
        shared: SharedState,
        outbox: Outbox,
        executor: Arc<TaskExecutor>,
    ) -> (Self, mpsc::UnboundedReceiver<TaskFinished>) {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();

        (
            Self {
                state: ProtocolState::Unregistered,
                shared,
                outbox,
                executor,
                finished_tx,
            },
            finished_rx,
        )
    }

    /// Current protocol state
    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Handle one inbound text frame; malformed frames are logged and dropped
    pub fn handle_text(&mut self, text: &str) {
        match ServerMessage::from_json(text) {
            Ok(message) => self.handle_message(message),
            Err(e) => warn!(error = %e, frame_len = text.len(), "Dropping malformed frame"),
        }
    }

    /// Handle one parsed inbound message
    pub fn handle_message(&mut self, message: ServerMessage) {
        debug!(message_type = message.type_name(), state = ?self.state, "Inbound message");

        match message {
            ServerMessage::Connected(connected) => self.on_connected(connected),
            ServerMessage::Task(envelope) => self.on_task(envelope),
            ServerMessage::InvalidTask { task_id, error } => self.on_invalid_task(task_id, error),
            ServerMessage::Pong => {}
            ServerMessage::Ping => self.send(ClientMessage::Pong),
            ServerMessage::Unknown(message_type) => {
                info!(message_type = %message_type, "Ignoring unknown message type");
            }
        }
    }

    fn on_connected(&mut self, connected: ConnectedMessage) {
        if self.state != ProtocolState::Unregistered {
            info!(
                worker_id = %connected.worker_id,
                state = ?self.state,
                "Ignoring registration confirmation, already registered"
            );
            return;
        }

        self.shared.write().worker_id = Some(connected.worker_id.clone());
        self.state = ProtocolState::AwaitingReady;

        match self.outbox.send(ClientMessage::Ready) {
            Ok(()) => {
                self.state = ProtocolState::Ready;
                info!(worker_id = %connected.worker_id, "Registered with dispatch server");
            }
            Err(e) => warn!(error = %e, "Failed to send ready"),
        }
    }

    fn on_task(&mut self, envelope: TaskEnvelope) {
        let running = match &self.state {
            ProtocolState::Ready => self.shared.read().current_task.clone(),
            ProtocolState::Busy { task_id } => Some(task_id.clone()),
            ProtocolState::Unregistered | ProtocolState::AwaitingReady => {
                warn!(task_id = %envelope.task_id, "Rejecting task before registration");
                self.reject(envelope.task_id, NOT_READY_ERROR.to_string());
                return;
            }
        };

        // A task from an earlier session may still be executing
        if let Some(current) = running {
            warn!(task_id = %envelope.task_id, current = %current, "Rejecting task while busy");
            let err = Error::WorkerBusy {
                current_task_id: current,
            };
            self.reject(envelope.task_id, err.to_string());
            return;
        }

        info!(task_id = %envelope.task_id, "Task received");
        self.state = ProtocolState::Busy {
            task_id: envelope.task_id.clone(),
        };
        self.shared.write().current_task = Some(envelope.task_id.clone());

        let executor = self.executor.clone();
        let shared = self.shared.clone();
        let finished_tx = self.finished_tx.clone();

        tokio::spawn(async move {
            let result = executor.execute(&envelope).await;

            {
                let mut s = shared.write();
                if result.success {
                    s.tasks_completed += 1;
                } else {
                    s.tasks_failed += 1;
                }
                if s.current_task.as_deref() == Some(envelope.task_id.as_str()) {
                    s.current_task = None;
                }
            }

            let task_id = envelope.task_id;
            let report = result.into_message(task_id.clone());
            if finished_tx.send(TaskFinished { task_id: task_id.clone(), report }).is_err() {
                warn!(task_id = %task_id, "Session closed before task finished, dropping result");
            }
        });
    }

    fn on_invalid_task(&self, task_id: String, error: String) {
        warn!(task_id = %task_id, error = %error, "Rejecting task with unreadable envelope");
        self.reject(task_id, error);
    }

    /// Return to Ready and report a finished task
    pub fn task_finished(&mut self, finished: TaskFinished) {
        match &self.state {
            ProtocolState::Busy { task_id } if *task_id == finished.task_id => {
                self.state = ProtocolState::Ready;
            }
            other => {
                debug!(task_id = %finished.task_id, state = ?other, "Finished task is not the current one");
            }
        }

        self.send(finished.report);
    }

    /// Drop back to Unregistered after the session ends
    pub fn reset(&mut self) {
        if let ProtocolState::Busy { task_id } = &self.state {
            info!(task_id = %task_id, "Session ended with task in flight");
        }
        self.state = ProtocolState::Unregistered;
    }

    fn reject(&self, task_id: String, error: String) {
        self.send(ClientMessage::TaskError {
            task_id,
            error,
            duration: 0,
        });
    }

    fn send(&self, message: ClientMessage) {
        let message_type = message.type_name();
        if let Err(e) = self.outbox.send(message) {
            warn!(error = %e, message_type, "Dropping outbound message");
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
