//! Protocol module for dispatch server communication
//!
//! Defines the message types and serialization for the worker-server protocol.
//! Every frame is a UTF-8 JSON text object discriminated by its `type` field.

mod messages;

pub use messages::*;
