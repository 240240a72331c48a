//! Common test utilities and fixtures
//!
//! A mock dispatch server speaking the worker protocol over a real socket.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

/// Default wait for anything the worker is expected to do
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Mock dispatch server
pub struct MockDispatch {
    url: String,
    conns_rx: mpsc::UnboundedReceiver<ServerConn>,
    accepted_at: Arc<Mutex<Vec<Instant>>>,
}

impl MockDispatch {
    /// Bind to an ephemeral port and start accepting
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conns_tx, conns_rx) = mpsc::unbounded_channel();
        let accepted_at = Arc::new(Mutex::new(Vec::new()));
        let accepted = accepted_at.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut uri = String::new();
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    uri = req.uri().to_string();
                    Ok(resp)
                };

                let Ok(ws) = accept_hdr_async(stream, callback).await else {
                    continue;
                };
                accepted.lock().push(Instant::now());
                if conns_tx.send(ServerConn { ws, uri }).is_err() {
                    break;
                }
            }
        });

        Self {
            url: format!("ws://{}/ws", addr),
            conns_rx,
            accepted_at,
        }
    }

    /// URL the worker should be configured with
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait for the next worker connection
    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(STEP_TIMEOUT, self.conns_rx.recv())
            .await
            .expect("timed out waiting for worker to connect")
            .expect("mock server stopped")
    }

    /// Wait up to `wait` for a connection; `None` if none arrives
    pub async fn try_accept(&mut self, wait: Duration) -> Option<ServerConn> {
        tokio::time::timeout(wait, self.conns_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// When each connection finished its handshake
    pub fn accept_times(&self) -> Vec<Instant> {
        self.accepted_at.lock().clone()
    }
}

/// Server side of one worker session
pub struct ServerConn {
    ws: WebSocketStream<TcpStream>,
    /// Request URI of the upgrade request, including the query
    pub uri: String,
}

impl ServerConn {
    /// Send a JSON text frame
    pub async fn send_json(&mut self, value: Value) {
        self.ws.send(WsMessage::Text(value.to_string())).await.unwrap();
    }

    /// Send a raw text frame
    pub async fn send_raw(&mut self, text: &str) {
        self.ws.send(WsMessage::Text(text.to_string())).await.unwrap();
    }

    /// Next JSON text frame from the worker; `None` once the session ends
    pub async fn recv_json(&mut self) -> Option<Value> {
        let next = tokio::time::timeout(STEP_TIMEOUT, async {
            while let Some(msg) = self.ws.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        return Some(serde_json::from_str(&text).expect("worker sent invalid JSON"))
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => return None,
                    Ok(_) => continue,
                }
            }
            None
        });
        next.await.expect("timed out waiting for worker message")
    }

    /// Next message of the given type, skipping heartbeat pings
    pub async fn recv_type(&mut self, message_type: &str) -> Value {
        loop {
            let value = self
                .recv_json()
                .await
                .unwrap_or_else(|| panic!("session ended before '{}' arrived", message_type));
            if value["type"] == message_type {
                return value;
            }
            if value["type"] != "ping" {
                panic!("expected '{}', got {}", message_type, value);
            }
        }
    }

    /// Collect everything the worker sends during `window`
    pub async fn collect_for(&mut self, window: Duration) -> Vec<Value> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    seen.push(serde_json::from_str(&text).expect("worker sent invalid JSON"))
                }
                Ok(Some(Ok(WsMessage::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => break,
                Ok(Some(Ok(_))) => continue,
                Err(_) => break,
            }
        }
        seen
    }

    /// Register the worker and consume its `ready`
    pub async fn register(&mut self, worker_id: &str) {
        self.send_json(serde_json::json!({
            "type": "connected",
            "workerId": worker_id,
            "message": "Connected to Task Dispatcher",
        }))
        .await;
        self.recv_type("ready").await;
    }

    /// Close the session from the server side
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Poll `condition` until it holds or `STEP_TIMEOUT` passes
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + STEP_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
