//! Connection Supervisor
//!
//! Owns the reconnect loop and the lifecycle of each session: opens the
//! session, starts a heartbeat monitor for it, pumps inbound frames into
//! the protocol handler and outbound messages onto the socket.

use std::sync::Arc;
use std::time::Instant;

use backoff::backoff::{Backoff, Constant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{WorkerConfig, WorkerSettings};
use crate::error::Result;
use crate::executor::TaskExecutor;
use crate::handler::TaskHandler;
use crate::transport::{CloseReason, Outbox, Session, SessionEvent};

use super::{ConnectionState, HeartbeatMonitor, ProtocolHandler, SharedState, WorkerState};

// ─────────────────────────────────────────────────────────────────
// Worker Handle
// ─────────────────────────────────────────────────────────────────

/// Cloneable control handle for a running [`Worker`]
#[derive(Clone)]
pub struct WorkerHandle {
    state: SharedState,
    stop: CancellationToken,
}

impl WorkerHandle {
    /// Stop the worker: closes the current session and prevents reconnects
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            info!("Stop requested");
        }
        self.stop.cancel();
    }

    /// Check whether stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Get current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().connection_state
    }

    /// Get the identity assigned by the server for the current session
    pub fn worker_id(&self) -> Option<String> {
        self.state.read().worker_id.clone()
    }

    /// Task currently executing, if any
    pub fn current_task(&self) -> Option<String> {
        self.state.read().current_task.clone()
    }

    /// Number of connection attempts so far
    pub fn connection_attempts(&self) -> u64 {
        self.state.read().connection_attempts
    }

    /// Completed and failed task counts
    pub fn task_counts(&self) -> (u64, u64) {
        let s = self.state.read();
        (s.tasks_completed, s.tasks_failed)
    }
}

// ─────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────

/// Long-lived dispatch worker
pub struct Worker {
    settings: WorkerSettings,
    url: Url,
    executor: Arc<TaskExecutor>,
    state: SharedState,
    stop: CancellationToken,
}

impl Worker {
    /// Create a worker from validated configuration and a task handler
    pub fn new(config: WorkerConfig, handler: Arc<dyn TaskHandler>) -> Result<Self> {
        config.validate()?;

        let url = config.worker.session_url()?;
        let executor = TaskExecutor::new(handler).with_timeout(config.executor.task_timeout());

        Ok(Self {
            settings: config.worker,
            url,
            executor: Arc::new(executor),
            state: WorkerState::shared(),
            stop: CancellationToken::new(),
        })
    }

    /// Get a control handle
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            state: self.state.clone(),
            stop: self.stop.clone(),
        }
    }

    /// URL sessions are opened against, including the group parameter
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Run until [`WorkerHandle::stop`] is called
    ///
    /// Connection failures and dropped sessions are never fatal; the worker
    /// waits `reconnect_interval` and opens a new session.
    pub async fn run(&self) {
        let reconnect_delay = self.settings.reconnect_delay();
        let mut backoff = Constant::new(reconnect_delay);

        info!(
            url = %self.url,
            group = %self.settings.group,
            name = self.settings.name.as_deref().unwrap_or("-"),
            handler = %self.executor.handler_name(),
            "Worker starting"
        );

        while !self.stop.is_cancelled() {
            let attempt = {
                let mut s = self.state.write();
                s.connection_attempts += 1;
                s.connection_state = ConnectionState::Connecting;
                s.connection_attempts
            };

            info!(url = %self.url, attempt, "Connecting to dispatch server");

            let opened = tokio::select! {
                _ = self.stop.cancelled() => break,
                result = Session::open(&self.url, self.settings.connect_timeout()) => result,
            };

            match opened {
                Ok(session) => {
                    let reason = self.run_session(session).await;
                    info!(reason = %reason, "Disconnected from dispatch server");
                }
                Err(e) => {
                    error!(
                        error = %e,
                        code = %e.code(),
                        retryable = e.is_retryable(),
                        attempt,
                        "Failed to connect to dispatch server"
                    );
                    self.state.write().mark_disconnected();
                }
            }

            if self.stop.is_cancelled() {
                break;
            }

            let delay = backoff.next_backoff().unwrap_or(reconnect_delay);
            info!(delay_secs = delay.as_secs(), "Waiting before reconnection");

            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state.write().mark_disconnected();

        let (completed, failed) = self.handle().task_counts();
        info!(
            tasks_completed = completed,
            tasks_failed = failed,
            "Worker shutting down"
        );
    }

    /// Drive one open session until it closes
    async fn run_session(&self, mut session: Session) -> CloseReason {
        {
            let mut s = self.state.write();
            s.connection_state = ConnectionState::Connected;
            s.connected_at = Some(Instant::now());
        }
        info!(url = %session.url(), "Connected to dispatch server");

        let (outbox, mut out_rx) = Outbox::channel(self.state.clone());
        let session_token = self.stop.child_token();
        let heartbeat = HeartbeatMonitor::new(
            self.settings.heartbeat_period(),
            outbox.clone(),
            session_token.clone(),
        )
        .spawn();
        let (mut protocol, mut finished_rx) =
            ProtocolHandler::new(self.state.clone(), outbox, self.executor.clone());

        let reason = loop {
            tokio::select! {
                biased;

                _ = self.stop.cancelled() => {
                    self.state.write().connection_state = ConnectionState::Closing;
                    if let Err(e) = session.close().await {
                        debug!(error = %e, "Error closing session");
                    }
                    break CloseReason::Local;
                }

                Some(finished) = finished_rx.recv() => protocol.task_finished(finished),

                Some(message) = out_rx.recv() => {
                    let text = match message.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, message_type = message.type_name(), "Failed to encode message");
                            continue;
                        }
                    };
                    if let Err(e) = session.send_text(text).await {
                        warn!(error = %e, message_type = message.type_name(), "Failed to send message");
                        break CloseReason::Error(e.to_string());
                    }
                    debug!(message_type = message.type_name(), "Sent message");
                }

                event = session.next_event() => match event {
                    Some(SessionEvent::Frame(text)) => protocol.handle_text(&text),
                    Some(SessionEvent::Closed(reason)) => break reason,
                    None => break CloseReason::Ended,
                },
            }
        };

        session_token.cancel();
        protocol.reset();
        if let Err(e) = session.close().await {
            debug!(error = %e, "Error closing session");
        }
        self.state.write().mark_disconnected();

        match heartbeat.await {
            Ok(pings) => debug!(pings, "Heartbeat finished"),
            Err(e) => warn!(error = %e, "Heartbeat task failed"),
        }

        reason
    }
}
