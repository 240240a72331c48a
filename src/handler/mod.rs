//! Task handler module
//!
//! The pluggable collaborator that turns a task payload into a result
//! document, plus the built-in handlers shipped with the worker.

mod echo;
mod registry;
mod traits;

pub use echo::EchoHandler;
pub use registry::*;
pub use traits::*;
