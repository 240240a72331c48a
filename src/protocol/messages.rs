//! Protocol message definitions
//!
//! All message types for worker-server communication.
//! Messages are serialized as JSON with a `type` discriminator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Server → Worker
// ─────────────────────────────────────────────────────────────────

/// Messages received from the dispatch server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Registration confirmation carrying the assigned worker identity
    Connected(ConnectedMessage),

    /// A unit of work
    Task(TaskEnvelope),

    /// A task frame with a usable `taskId` whose envelope did not parse
    InvalidTask { task_id: String, error: String },

    /// Reply to our liveness probe
    Pong,

    /// Server-initiated liveness probe
    Ping,

    /// Any other `type` value
    Unknown(String),
}

/// Registration confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedMessage {
    /// Identity assigned by the server for this connection
    #[serde(rename = "workerId")]
    pub worker_id: String,

    /// Optional greeting text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The wrapper around a task's identifier and payload as received over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Opaque task identifier
    #[serde(rename = "taskId")]
    pub task_id: String,

    /// Task document handed to the handler. Older servers send it as `data`.
    #[serde(default, alias = "data")]
    pub payload: TaskPayload,
}

/// Structured task document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Model the task targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Task input data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Chat-style message list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Value>>,

    /// Any other fields, preserved as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerMessage {
    /// Parse a text frame
    ///
    /// Unknown `type` values parse successfully as [`ServerMessage::Unknown`];
    /// malformed JSON or a missing `type` field is an error.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let message_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ProtocolMalformed {
                message: "missing string field 'type'".to_string(),
            })?
            .to_string();

        let message = match message_type.as_str() {
            "connected" => ServerMessage::Connected(serde_json::from_value(value)?),
            "task" => Self::parse_task(value)?,
            "pong" => ServerMessage::Pong,
            "ping" => ServerMessage::Ping,
            _ => ServerMessage::Unknown(message_type),
        };

        Ok(message)
    }

    fn parse_task(value: Value) -> Result<Self> {
        let task_id = value.get("taskId").and_then(Value::as_str).map(str::to_string);

        match (serde_json::from_value::<TaskEnvelope>(value), task_id) {
            (Ok(envelope), _) => Ok(ServerMessage::Task(envelope)),
            (Err(e), Some(task_id)) => Ok(ServerMessage::InvalidTask {
                task_id,
                error: format!("Invalid task payload: {}", e),
            }),
            (Err(e), None) => Err(e.into()),
        }
    }

    /// Get the message type name
    pub fn type_name(&self) -> &str {
        match self {
            ServerMessage::Connected(_) => "connected",
            ServerMessage::Task(_) | ServerMessage::InvalidTask { .. } => "task",
            ServerMessage::Pong => "pong",
            ServerMessage::Ping => "ping",
            ServerMessage::Unknown(name) => name,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Worker → Server
// ─────────────────────────────────────────────────────────────────

/// Messages sent to the dispatch server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Worker is registered and can take work
    Ready,

    /// Liveness probe
    Ping,

    /// Reply to a server-initiated probe
    Pong,

    /// Task finished successfully
    TaskComplete {
        #[serde(rename = "taskId")]
        task_id: String,
        result: Value,
        /// Wall-clock execution time in milliseconds
        duration: u64,
    },

    /// Task failed
    TaskError {
        #[serde(rename = "taskId")]
        task_id: String,
        error: String,
        /// Wall-clock execution time in milliseconds
        duration: u64,
    },
}

impl ClientMessage {
    /// Get the message type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::Ready => "ready",
            ClientMessage::Ping => "ping",
            ClientMessage::Pong => "pong",
            ClientMessage::TaskComplete { .. } => "task_complete",
            ClientMessage::TaskError { .. } => "task_error",
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_connected() {
        let msg = ServerMessage::from_json(
            r#"{"type":"connected","workerId":"w1","message":"Connected to Task Dispatcher"}"#,
        )
        .unwrap();

        match msg {
            ServerMessage::Connected(c) => {
                assert_eq!(c.worker_id, "w1");
                assert_eq!(c.message.as_deref(), Some("Connected to Task Dispatcher"));
            }
            other => panic!("Expected Connected, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_connected_requires_worker_id() {
        assert!(ServerMessage::from_json(r#"{"type":"connected"}"#).is_err());
    }

    #[test]
    fn test_parse_task() {
        let msg = ServerMessage::from_json(
            r#"{"type":"task","taskId":"t1","payload":{"model":"gpt","data":{"x":1},"messages":[{"role":"user"}],"stream":false}}"#,
        )
        .unwrap();

        let ServerMessage::Task(envelope) = msg else {
            panic!("Expected Task message");
        };
        assert_eq!(envelope.task_id, "t1");
        assert_eq!(envelope.payload.model.as_deref(), Some("gpt"));
        assert_eq!(envelope.payload.data, Some(json!({"x": 1})));
        assert_eq!(envelope.payload.messages.as_ref().map(Vec::len), Some(1));
        assert_eq!(envelope.payload.extra.get("stream"), Some(&json!(false)));
    }

    #[test]
    fn test_parse_task_legacy_data_field() {
        let msg = ServerMessage::from_json(r#"{"type":"task","taskId":"t2","data":{"data":{"y":2}}}"#)
            .unwrap();

        let ServerMessage::Task(envelope) = msg else {
            panic!("Expected Task message");
        };
        assert_eq!(envelope.payload.data, Some(json!({"y": 2})));
        assert!(envelope.payload.model.is_none());
    }

    #[test]
    fn test_parse_task_without_payload() {
        let msg = ServerMessage::from_json(r#"{"type":"task","taskId":"t3"}"#).unwrap();
        let ServerMessage::Task(envelope) = msg else {
            panic!("Expected Task message");
        };
        assert_eq!(envelope.payload, TaskPayload::default());
    }

    #[test]
    fn test_parse_task_with_bad_payload_keeps_task_id() {
        let msg = ServerMessage::from_json(r#"{"type":"task","taskId":"t4","payload":null}"#).unwrap();
        match msg {
            ServerMessage::InvalidTask { task_id, error } => {
                assert_eq!(task_id, "t4");
                assert!(error.starts_with("Invalid task payload"), "got {}", error);
            }
            other => panic!("Expected InvalidTask, got {:?}", other),
        }

        let msg = ServerMessage::from_json(r#"{"type":"task","taskId":"t5","payload":{"model":7}}"#)
            .unwrap();
        assert!(matches!(msg, ServerMessage::InvalidTask { ref task_id, .. } if task_id == "t5"));
        assert_eq!(msg.type_name(), "task");
    }

    #[test]
    fn test_parse_task_without_usable_id() {
        assert!(matches!(
            ServerMessage::from_json(r#"{"type":"task","payload":{}}"#),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            ServerMessage::from_json(r#"{"type":"task","taskId":9}"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_parse_pong_ping_unknown() {
        assert_eq!(ServerMessage::from_json(r#"{"type":"pong"}"#).unwrap(), ServerMessage::Pong);
        assert_eq!(ServerMessage::from_json(r#"{"type":"ping"}"#).unwrap(), ServerMessage::Ping);

        let unknown = ServerMessage::from_json(r#"{"type":"reboot","now":true}"#).unwrap();
        assert_eq!(unknown, ServerMessage::Unknown("reboot".to_string()));
        assert_eq!(unknown.type_name(), "reboot");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            ServerMessage::from_json("{not json"),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            ServerMessage::from_json(r#"{"taskId":"t1"}"#),
            Err(Error::ProtocolMalformed { .. })
        ));
        assert!(matches!(
            ServerMessage::from_json(r#"{"type":7}"#),
            Err(Error::ProtocolMalformed { .. })
        ));
    }

    #[test]
    fn test_outbound_shapes() {
        assert_eq!(ClientMessage::Ready.to_json().unwrap(), r#"{"type":"ready"}"#);
        assert_eq!(ClientMessage::Ping.to_json().unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(ClientMessage::Pong.to_json().unwrap(), r#"{"type":"pong"}"#);

        let complete = ClientMessage::TaskComplete {
            task_id: "t1".to_string(),
            result: json!({"ok": true}),
            duration: 10,
        };
        let value: Value = serde_json::from_str(&complete.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "task_complete", "taskId": "t1", "result": {"ok": true}, "duration": 10})
        );

        let failed = ClientMessage::TaskError {
            task_id: "t1".to_string(),
            error: "boom".to_string(),
            duration: 3,
        };
        let value: Value = serde_json::from_str(&failed.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "task_error", "taskId": "t1", "error": "boom", "duration": 3})
        );
        assert_eq!(failed.type_name(), "task_error");
    }
}
