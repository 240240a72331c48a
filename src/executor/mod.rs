//! Task executor module
//!
//! Runs one task through the configured handler and turns the outcome
//! into the completion or error report sent back to the server.

mod runner;

pub use runner::*;
