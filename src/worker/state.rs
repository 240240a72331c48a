//! Per-worker connection state
//!
//! One [`WorkerState`] exists per running worker. The session-owning context
//! is the only writer of the connection fields; the heartbeat monitor and the
//! send path only read them.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

/// Shared handle to a worker's state
pub type SharedState = Arc<RwLock<WorkerState>>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session exists
    #[default]
    Disconnected,
    /// A session is being opened
    Connecting,
    /// Session is open; sends are legal
    Connected,
    /// Session is shutting down
    Closing,
}

/// Worker state shared between the session loop, heartbeat and send path
#[derive(Debug, Default)]
pub struct WorkerState {
    /// Current connection state
    pub connection_state: ConnectionState,

    /// Identity assigned by the server, cleared on disconnect
    pub worker_id: Option<String>,

    /// When the current session was opened
    pub connected_at: Option<Instant>,

    /// Number of connection attempts made so far
    pub connection_attempts: u64,

    /// Tasks that produced a `task_complete`
    pub tasks_completed: u64,

    /// Tasks that produced a `task_error`
    pub tasks_failed: u64,

    /// Task currently executing; outlives the session it arrived on
    pub current_task: Option<String>,
}

impl WorkerState {
    /// Create a new shared state
    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Check whether sends are currently legal
    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    /// Check whether a task is executing, from this session or an earlier one
    pub fn is_busy(&self) -> bool {
        self.current_task.is_some()
    }

    /// Mark the session as gone and forget the server-assigned identity
    pub fn mark_disconnected(&mut self) {
        self.connection_state = ConnectionState::Disconnected;
        self.worker_id = None;
        self.connected_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_default() {
        let state = WorkerState::default();
        assert_eq!(state.connection_state, ConnectionState::Disconnected);
        assert!(state.worker_id.is_none());
        assert!(!state.is_connected());
    }

    #[test]
    fn test_mark_disconnected_clears_identity() {
        let shared = WorkerState::shared();
        {
            let mut s = shared.write();
            s.connection_state = ConnectionState::Connected;
            s.worker_id = Some("w1".to_string());
            s.connected_at = Some(Instant::now());
        }

        shared.write().mark_disconnected();

        let s = shared.read();
        assert_eq!(s.connection_state, ConnectionState::Disconnected);
        assert!(s.worker_id.is_none());
        assert!(s.connected_at.is_none());
    }

    #[test]
    fn test_running_task_survives_disconnect() {
        let shared = WorkerState::shared();
        shared.write().current_task = Some("t1".to_string());

        shared.write().mark_disconnected();

        assert!(shared.read().is_busy());
        assert_eq!(shared.read().current_task.as_deref(), Some("t1"));
    }
}
