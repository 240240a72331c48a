//! Send path shared by the protocol handler, heartbeat monitor and task runs

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::ClientMessage;
use crate::worker::SharedState;

/// Cloneable handle for queueing outbound messages on one session
///
/// Messages are written to the socket by the session loop in the order they
/// were queued. A send fails with [`Error::NotConnected`] when the connection
/// state is not `Connected` or when the owning session has ended.
#[derive(Clone)]
pub struct Outbox {
    state: SharedState,
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl Outbox {
    /// Create an outbox and the receiver the session loop drains
    pub fn channel(state: SharedState) -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { state, tx }, rx)
    }

    /// Queue a message for the current session
    pub fn send(&self, message: ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.tx.send(message).map_err(|_| Error::NotConnected)
    }

    /// Check whether the owning session can still accept messages
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected() && !self.tx.is_closed()
    }
}
