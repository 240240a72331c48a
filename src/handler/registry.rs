//! Handler Registry
//!
//! Routes tasks to handlers by the payload's `model` field.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::config::ExecutorSettings;
use crate::error::{Error, Result};
use crate::protocol::TaskPayload;

use super::{EchoHandler, TaskHandler};

/// Names accepted by `executor.handler`
pub const BUILTIN_HANDLERS: &[&str] = &["echo"];

/// Build the configured built-in handler
pub fn builtin_handler(settings: &ExecutorSettings) -> Result<Arc<dyn TaskHandler>> {
    match settings.handler.to_lowercase().as_str() {
        "echo" => {
            let echo = EchoHandler::new(Duration::from_millis(settings.simulated_delay_ms));
            Ok(Arc::new(HandlerRegistry::with_fallback(Arc::new(echo))))
        }
        other => Err(Error::config_field_invalid(
            "executor.handler",
            format!(
                "Unknown handler '{}'. Must be one of: {}",
                other,
                BUILTIN_HANDLERS.join(", ")
            ),
        )),
    }
}

// ─────────────────────────────────────────────────────────────────
// Handler Registry
// ─────────────────────────────────────────────────────────────────

/// Per-model handler table with an optional fallback
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    fallback: Option<Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry; tasks fail unless a model matches
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            fallback: None,
        }
    }

    /// Create a registry that sends unmatched models to `fallback`
    pub fn with_fallback(fallback: Arc<dyn TaskHandler>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            fallback: Some(fallback),
        }
    }

    /// Register a handler for a model name, replacing any previous one
    pub fn register(&self, model: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(model.into(), handler);
    }

    /// Find the handler for a payload
    pub fn resolve(&self, payload: &TaskPayload) -> Option<Arc<dyn TaskHandler>> {
        payload
            .model
            .as_ref()
            .and_then(|model| self.handlers.read().get(model).cloned())
            .or_else(|| self.fallback.clone())
    }

    /// Registered model names
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.handlers.read().keys().cloned().collect();
        models.sort();
        models
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskHandler for HandlerRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    async fn handle(&self, payload: &TaskPayload) -> anyhow::Result<Value> {
        let handler = self.resolve(payload).ok_or_else(|| {
            anyhow!(
                "no handler registered for model '{}'",
                payload.model.as_deref().unwrap_or("default")
            )
        })?;

        debug!(handler = %handler.name(), model = ?payload.model, "Routing task");
        handler.handle(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(&'static str);

    #[async_trait]
    impl TaskHandler for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn handle(&self, _payload: &TaskPayload) -> anyhow::Result<Value> {
            Ok(json!({ "handler": self.0 }))
        }
    }

    fn payload_for(model: Option<&str>) -> TaskPayload {
        TaskPayload {
            model: model.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_routes_by_model() {
        let registry = HandlerRegistry::with_fallback(Arc::new(Fixed("fallback")));
        registry.register("gemini-image", Arc::new(Fixed("gemini")));

        let routed = registry.handle(&payload_for(Some("gemini-image"))).await.unwrap();
        assert_eq!(routed, json!({"handler": "gemini"}));

        let unmatched = registry.handle(&payload_for(Some("other"))).await.unwrap();
        assert_eq!(unmatched, json!({"handler": "fallback"}));

        let no_model = registry.handle(&payload_for(None)).await.unwrap();
        assert_eq!(no_model, json!({"handler": "fallback"}));
    }

    #[tokio::test]
    async fn test_unmatched_without_fallback_fails() {
        let registry = HandlerRegistry::new();
        registry.register("a", Arc::new(Fixed("a")));

        let err = registry.handle(&payload_for(Some("b"))).await.unwrap_err();
        assert_eq!(err.to_string(), "no handler registered for model 'b'");
        assert_eq!(registry.models(), vec!["a".to_string()]);
    }

    #[test]
    fn test_builtin_handler_lookup() {
        let mut settings = ExecutorSettings::default();
        assert!(builtin_handler(&settings).is_ok());

        settings.handler = "ECHO".to_string();
        assert!(builtin_handler(&settings).is_ok());

        settings.handler = "shell".to_string();
        assert!(matches!(
            builtin_handler(&settings),
            Err(Error::ConfigValidation { ref field, .. }) if field.as_deref() == Some("executor.handler")
        ));
    }
}
