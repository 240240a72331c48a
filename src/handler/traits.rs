//! Task handler trait definition
//!
//! The single point where domain-specific logic enters the worker.

use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::TaskPayload;

/// Executes the business logic of a task
///
/// Implementations return the result document on success. Any error is
/// reported to the server as a `task_error` carrying the error's display text.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Handler name, used in logs
    fn name(&self) -> &str;

    /// Run the task
    async fn handle(&self, payload: &TaskPayload) -> anyhow::Result<Value>;
}
