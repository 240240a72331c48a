//! Worker module
//!
//! The connection supervisor, the per-session protocol state machine and
//! the heartbeat monitor, plus the state they share.

mod heartbeat;
mod protocol_handler;
mod state;
mod supervisor;

pub use heartbeat::HeartbeatMonitor;
pub use protocol_handler::*;
pub use state::*;
pub use supervisor::*;
