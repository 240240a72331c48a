//! Echo handler
//!
//! Stands in for real work: waits for a fixed delay and returns the task
//! data alongside a completion message.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use crate::protocol::TaskPayload;

use super::TaskHandler;

/// Returns the task data after a simulated processing delay
#[derive(Debug, Clone)]
pub struct EchoHandler {
    delay: Duration,
}

impl EchoHandler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl TaskHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    async fn handle(&self, payload: &TaskPayload) -> anyhow::Result<Value> {
        let model = payload.model.as_deref().unwrap_or("default");
        debug!(model = %model, delay_ms = self.delay.as_millis() as u64, "Processing task");

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        Ok(json!({
            "success": true,
            "message": "Task processed",
            "model": model,
            "processedData": payload.data.clone().unwrap_or_else(|| json!({})),
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}
