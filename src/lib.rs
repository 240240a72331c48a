//! TaskOrchard Worker
//!
//! A long-lived client that keeps a WebSocket session to a TaskOrchard
//! dispatch server, registers into a worker group, executes the tasks it
//! receives through a pluggable [`handler::TaskHandler`] and reports the
//! results over the same session.
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskorchard_worker::{config::WorkerConfig, handler, worker::Worker};
//!
//! # async fn example() -> taskorchard_worker::error::Result<()> {
//! let config = WorkerConfig::load(None)?;
//! let handler = handler::builtin_handler(&config.executor)?;
//! let worker = Worker::new(config, handler)?;
//!
//! let handle = worker.handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     handle.stop();
//! });
//!
//! worker.run().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod transport;
pub mod version;
pub mod worker;
