//! One physical WebSocket connection to the dispatch server

use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame
    Remote { code: Option<u16>, reason: String },
    /// Transport failed mid-session
    Error(String),
    /// Stream ended without a close frame
    Ended,
    /// We closed the session ourselves
    Local,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Remote { code: Some(code), reason } => {
                write!(f, "closed by server ({}): {}", code, reason)
            }
            CloseReason::Remote { code: None, .. } => write!(f, "closed by server"),
            CloseReason::Error(e) => write!(f, "transport error: {}", e),
            CloseReason::Ended => write!(f, "stream ended"),
            CloseReason::Local => write!(f, "closed locally"),
        }
    }
}

/// Events delivered by an open session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An inbound text frame
    Frame(String),
    /// The session is over; reported exactly once
    Closed(CloseReason),
}

/// An open WebSocket session
pub struct Session {
    url: Url,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
    close_reported: bool,
}

impl Session {
    /// Open a session, failing if the handshake does not finish within `timeout`
    pub async fn open(url: &Url, timeout: Duration) -> Result<Self> {
        match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, _response))) => Ok(Self {
                url: url.clone(),
                stream,
                closed: false,
                close_reported: false,
            }),
            Ok(Err(e)) => Err(Error::connection_failed(url.as_str(), e.to_string())),
            Err(_) => Err(Error::connection_timeout(url.as_str(), timeout.as_secs())),
        }
    }

    /// The URL this session was opened against
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Wait for the next event
    ///
    /// Text frames are delivered in arrival order. Returns `None` once the
    /// closing event has been reported. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if self.close_reported {
            return None;
        }
        if self.closed {
            return Some(self.report_close(CloseReason::Local));
        }

        loop {
            let reason = match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Some(SessionEvent::Frame(text)),
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Some(SessionEvent::Frame(text)),
                    Err(e) => {
                        warn!(error = %e, "Dropping non UTF-8 binary frame");
                        continue;
                    }
                },
                // tungstenite queues the pong reply itself
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Frame(_))) => continue,
                Some(Ok(WsMessage::Close(frame))) => match frame {
                    Some(frame) => CloseReason::Remote {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.into_owned(),
                    },
                    None => CloseReason::Remote {
                        code: None,
                        reason: String::new(),
                    },
                },
                Some(Err(e)) => CloseReason::Error(e.to_string()),
                None => CloseReason::Ended,
            };

            self.closed = true;
            return Some(self.report_close(reason));
        }
    }

    fn report_close(&mut self, reason: CloseReason) -> SessionEvent {
        self.close_reported = true;
        SessionEvent::Closed(reason)
    }

    /// Write a text frame; best effort, no acknowledgement
    pub async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(Error::NotConnected);
        }
        match self.stream.send(WsMessage::Text(text)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.closed = true;
                Err(e.into())
            }
        }
    }

    /// Close the session. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                debug!(url = %self.url, "Session closed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether the session has been closed from either side
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
