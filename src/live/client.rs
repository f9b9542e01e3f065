use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use super::messages::{RealtimeInput, ServerMessage, SessionSetup};
use crate::error::SessionError;

/// Events delivered by a live transport.
///
/// The session state machine transitions consistently regardless of which
/// of these fires; they correspond to the endpoint's open / message /
/// error / close callbacks.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// The endpoint acknowledged setup; streaming may begin.
    Opened,
    /// One inbound server message.
    Message(ServerMessage),
    /// Mid-session transport failure.
    Error(String),
    /// The endpoint closed the stream.
    Closed,
}

/// A connected live stream: inbound events plus the outbound audio lane.
///
/// Dropping `input` closes the outbound lane, which asks the transport to
/// close the underlying stream.
pub struct LiveConnection {
    pub events: mpsc::Receiver<LiveEvent>,
    pub input: mpsc::Sender<RealtimeInput>,
}

/// Transport to the streaming speech endpoint.
#[async_trait::async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open the stream and perform setup.
    ///
    /// Fails with `SessionError::ConnectionFailed` when the endpoint cannot
    /// be reached; later failures arrive as `LiveEvent::Error`.
    async fn connect(&mut self, setup: &SessionSetup) -> Result<LiveConnection, SessionError>;
}

/// WebSocket implementation of the live transport.
pub struct WebSocketTransport {
    endpoint: String,
    api_key: String,
}

impl WebSocketTransport {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self { endpoint, api_key }
    }
}

#[async_trait::async_trait]
impl LiveTransport for WebSocketTransport {
    async fn connect(&mut self, setup: &SessionSetup) -> Result<LiveConnection, SessionError> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);

        info!("Connecting to live endpoint: {}", self.endpoint);

        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = socket.split();

        write
            .send(Message::Text(setup.to_wire().to_string()))
            .await
            .map_err(|e| SessionError::ConnectionFailed(format!("setup send failed: {e}")))?;

        let (event_tx, event_rx) = mpsc::channel::<LiveEvent>(64);
        let (input_tx, mut input_rx) = mpsc::channel::<RealtimeInput>(64);

        // Read half: parse frames into events until the socket ends.
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => parse_inbound(text.as_bytes()),
                    Ok(Message::Binary(bytes)) => parse_inbound(&bytes),
                    Ok(Message::Close(_)) => {
                        let _ = event_tx.send(LiveEvent::Closed).await;
                        return;
                    }
                    Ok(_) => None,
                    Err(e) => {
                        let _ = event_tx.send(LiveEvent::Error(e.to_string())).await;
                        return;
                    }
                };

                if let Some(event) = event {
                    if event_tx.send(event).await.is_err() {
                        // Session is gone; stop reading.
                        return;
                    }
                }
            }

            let _ = event_tx.send(LiveEvent::Closed).await;
        });

        // Write half: forward realtime input until the session drops its
        // sender, then close the stream.
        tokio::spawn(async move {
            while let Some(input) = input_rx.recv().await {
                let envelope = serde_json::json!({ "realtimeInput": input });
                if let Err(e) = write.send(Message::Text(envelope.to_string())).await {
                    warn!("Live endpoint send failed: {}", e);
                    break;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        Ok(LiveConnection {
            events: event_rx,
            input: input_tx,
        })
    }
}

/// Parse one inbound frame.
///
/// The setup acknowledgement becomes `Opened`; anything else is decoded as
/// a `ServerMessage`. Unparseable frames are dropped with a warning, never
/// fatal.
fn parse_inbound(bytes: &[u8]) -> Option<LiveEvent> {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!("Dropping unparseable inbound frame: {}", e);
            return None;
        }
    };

    if value.get("setupComplete").is_some() {
        return Some(LiveEvent::Opened);
    }

    match serde_json::from_value::<ServerMessage>(value) {
        Ok(message) => Some(LiveEvent::Message(message)),
        Err(e) => {
            warn!("Dropping inbound frame with unexpected shape: {}", e);
            None
        }
    }
}
