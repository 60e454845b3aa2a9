//! WebSocket transport
//!
//! Single responsibility: connect to a WebSocket and exchange JSON text
//! frames. No knowledge of handshakes, events, or reconnection.

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Serialize;
use serde_json::Value;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::error::ChannelError;

/// Send half of the WebSocket.
pub(crate) type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Receive half of the WebSocket.
pub(crate) type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// A connected transport. Can only be constructed via
/// [`Transport::connect`].
pub(crate) struct Transport {
    sink: WsSink,
    stream: WsStream,
}

impl Transport {
    pub async fn connect(url: &str) -> Result<Self, ChannelError> {
        debug!(url = %url, "connecting to channel endpoint");

        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| ChannelError::TransportDropped(format!("connect failed: {}", e)))?;

        let (sink, stream) = ws.split();
        debug!(url = %url, "transport connected");
        Ok(Self { sink, stream })
    }

    pub async fn send_json<T: Serialize>(&mut self, frame: &T) -> Result<(), ChannelError> {
        let text = serde_json::to_string(frame)
            .map_err(|e| ChannelError::TransportDropped(format!("encode failed: {}", e)))?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::TransportDropped(e.to_string()))
    }

    /// Next JSON frame. Returns `None` when the connection closes.
    /// Undecodable frames are logged and skipped; ping/pong is handled by
    /// tungstenite.
    pub async fn recv_json(&mut self) -> Result<Option<Value>, ChannelError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => {
                        warn!(error = %e, "undecodable channel frame, skipping");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ChannelError::TransportDropped(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    /// Split into halves for concurrent send/receive.
    pub fn split(self) -> (WsSink, WsStream) {
        (self.sink, self.stream)
    }
}
