//! Transport session to the dispatch server
//!
//! - [`Session`]: one WebSocket connection with ordered text-frame delivery
//!   and an idempotent close
//! - [`Outbox`]: the send path handed to everything that writes to a session

mod outbox;
mod session;

pub use outbox::*;
pub use session::*;
