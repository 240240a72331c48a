//! Task execution runner
//!
//! Invokes the handler, measures wall-clock time and captures every failure
//! mode (error, timeout, panic) as a [`TaskResult`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{error, info};

use crate::error::Error;
use crate::handler::TaskHandler;
use crate::protocol::{ClientMessage, TaskEnvelope};

// ─────────────────────────────────────────────────────────────────
// Task Result
// ─────────────────────────────────────────────────────────────────

/// Outcome of a single task execution
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    /// Whether the handler produced a result
    pub success: bool,

    /// Result document, or `{"error": message}` on failure
    pub body: Value,

    /// Wall-clock execution time in milliseconds
    pub duration_ms: u64,
}

impl TaskResult {
    fn completed(body: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            body,
            duration_ms,
        }
    }

    fn failed(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            body: json!({ "error": message.into() }),
            duration_ms,
        }
    }

    /// The failure message, if this is a failure
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            return None;
        }
        self.body.get("error").and_then(Value::as_str)
    }

    /// Build the report for the server
    pub fn into_message(self, task_id: impl Into<String>) -> ClientMessage {
        let task_id = task_id.into();
        if self.success {
            ClientMessage::TaskComplete {
                task_id,
                result: self.body,
                duration: self.duration_ms,
            }
        } else {
            let error = self
                .error_message()
                .unwrap_or("task failed")
                .to_string();
            ClientMessage::TaskError {
                task_id,
                error,
                duration: self.duration_ms,
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Executor
// ─────────────────────────────────────────────────────────────────

/// Runs tasks through a handler
pub struct TaskExecutor {
    handler: Arc<dyn TaskHandler>,
    timeout: Option<Duration>,
}

impl TaskExecutor {
    /// Create an executor with no time limit
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            handler,
            timeout: None,
        }
    }

    /// Limit each task to `timeout`; `None` disables the limit
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the underlying handler
    pub fn handler_name(&self) -> &str {
        self.handler.name()
    }

    /// Execute one task
    ///
    /// Never fails: handler errors, timeouts and panics all come back as a
    /// failed [`TaskResult`].
    pub async fn execute(&self, envelope: &TaskEnvelope) -> TaskResult {
        let task_id = envelope.task_id.as_str();
        let start_time = Instant::now();

        info!(
            task_id = %task_id,
            model = envelope.payload.model.as_deref().unwrap_or("default"),
            handler = %self.handler.name(),
            "Starting task execution"
        );

        let call = AssertUnwindSafe(self.handler.handle(&envelope.payload)).catch_unwind();

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let err = Error::TaskTimeout {
                        task_id: task_id.to_string(),
                        timeout_secs: limit.as_secs(),
                    };
                    error!(task_id = %task_id, timeout_secs = limit.as_secs(), "Task timed out");
                    return TaskResult::failed(err.to_string(), elapsed_ms(start_time));
                }
            },
            None => call.await,
        };

        let duration_ms = elapsed_ms(start_time);

        match outcome {
            Ok(Ok(body)) => {
                info!(task_id = %task_id, duration_ms, "Task completed successfully");
                TaskResult::completed(body, duration_ms)
            }
            Ok(Err(e)) => {
                error!(task_id = %task_id, error = %e, duration_ms, "Task execution failed");
                TaskResult::failed(e.to_string(), duration_ms)
            }
            Err(panic) => {
                let message = format!("handler panicked: {}", panic_message(&*panic));
                error!(task_id = %task_id, duration_ms, "{}", message);
                TaskResult::failed(message, duration_ms)
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TaskPayload;
    use anyhow::bail;
    use async_trait::async_trait;

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Sleep(Duration),
    }

    struct ScriptedHandler(Behavior);

    #[async_trait]
    impl TaskHandler for ScriptedHandler {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn handle(&self, payload: &TaskPayload) -> anyhow::Result<Value> {
            match &self.0 {
                Behavior::Succeed => Ok(json!({ "model": payload.model })),
                Behavior::Fail => bail!("model unavailable"),
                Behavior::Panic => panic!("out of cheese"),
                Behavior::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(json!({}))
                }
            }
        }
    }

    fn make_envelope() -> TaskEnvelope {
        TaskEnvelope {
            task_id: "t1".to_string(),
            payload: TaskPayload {
                model: Some("gemini".to_string()),
                ..Default::default()
            },
        }
    }

    fn executor(behavior: Behavior) -> TaskExecutor {
        TaskExecutor::new(Arc::new(ScriptedHandler(behavior)))
    }

    #[tokio::test]
    async fn test_success_reports_complete() {
        let result = executor(Behavior::Succeed).execute(&make_envelope()).await;
        assert!(result.success);
        assert_eq!(result.body, json!({"model": "gemini"}));

        match result.into_message("t1") {
            ClientMessage::TaskComplete { task_id, result, .. } => {
                assert_eq!(task_id, "t1");
                assert_eq!(result, json!({"model": "gemini"}));
            }
            other => panic!("Expected TaskComplete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_reports_error() {
        let result = executor(Behavior::Fail).execute(&make_envelope()).await;
        assert!(!result.success);
        assert_eq!(result.error_message(), Some("model unavailable"));

        match result.into_message("t1") {
            ClientMessage::TaskError { error, .. } => assert_eq!(error, "model unavailable"),
            other => panic!("Expected TaskError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let result = executor(Behavior::Panic).execute(&make_envelope()).await;
        assert!(!result.success);
        assert_eq!(result.error_message(), Some("handler panicked: out of cheese"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_error() {
        let exec = executor(Behavior::Sleep(Duration::from_secs(10)))
            .with_timeout(Some(Duration::from_secs(2)));

        let result = exec.execute(&make_envelope()).await;
        assert!(!result.success);
        assert_eq!(result.error_message(), Some("Task t1 timed out after 2s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_is_measured() {
        let result = executor(Behavior::Sleep(Duration::from_millis(1500)))
            .execute(&make_envelope())
            .await;
        assert!(result.success);
        assert!(result.duration_ms >= 1500);
    }
}
