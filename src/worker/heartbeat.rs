//! Heartbeat Monitor
//!
//! Sends `{"type":"ping"}` every interval while the session is connected.
//! The server's `pong` is not tracked; the probe only keeps intermediaries
//! from idling the connection.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::protocol::ClientMessage;
use crate::transport::Outbox;

/// Periodic liveness probe bound to one session
pub struct HeartbeatMonitor {
    period: Duration,
    outbox: Outbox,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a monitor; `cancel` must be triggered when the session closes
    pub fn new(period: Duration, outbox: Outbox, cancel: CancellationToken) -> Self {
        Self {
            period,
            outbox,
            cancel,
        }
    }

    /// Spawn the monitor. The handle resolves to the number of probes sent.
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    /// Run until cancelled or the connection is no longer usable
    pub async fn run(self) -> u64 {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sent = 0u64;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.outbox.is_connected() {
                        debug!("Connection gone, heartbeat stopping");
                        break;
                    }
                    if self.outbox.send(ClientMessage::Ping).is_err() {
                        break;
                    }
                    sent += 1;
                    trace!(sent, "Sent heartbeat");
                }
            }
        }

        debug!(sent, "Heartbeat monitor stopped");
        sent
    }
}
