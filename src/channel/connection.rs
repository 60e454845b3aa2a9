//! Authenticated channel connection
//!
//! An `EstablishedChannel` can only be produced by a connector whose
//! handshake the server accepted within its budget: send the session token,
//! receive a server-assigned connection id. Holding one means the channel
//! is live and authorized.
//!
//! The connector is the seam between the reconnect state machine and the
//! wire: the production implementation speaks WebSocket, tests script
//! their own.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::SinkExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::events::ChannelEvent;
use super::transport::{Transport, WsSink, WsStream};
use crate::error::ChannelError;

#[derive(Serialize)]
struct AuthFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    token: &'a str,
}

/// A live, authenticated channel.
///
/// `outbound` frames go to the server; `inbound` yields server events in
/// delivery order and closes when the transport drops. Dropping the value
/// aborts the I/O tasks, so an abandoned connection cannot leak.
pub struct EstablishedChannel {
    pub connection_id: String,
    pub outbound: mpsc::Sender<ChannelEvent>,
    pub inbound: mpsc::Receiver<ChannelEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl EstablishedChannel {
    pub fn new(
        connection_id: String,
        outbound: mpsc::Sender<ChannelEvent>,
        inbound: mpsc::Receiver<ChannelEvent>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            connection_id,
            outbound,
            inbound,
            tasks,
        }
    }
}

impl Drop for EstablishedChannel {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Opens authenticated channels. The seam tests inject through.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(
        &self,
        url: &str,
        token: &str,
        handshake_timeout: Duration,
    ) -> Result<EstablishedChannel, ChannelError>;
}

/// Production connector speaking WebSocket with JSON frames.
pub struct WsConnector;

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(
        &self,
        url: &str,
        token: &str,
        handshake_timeout: Duration,
    ) -> Result<EstablishedChannel, ChannelError> {
        // One budget for the whole upgrade: dial, auth frame, server reply.
        let handshake = async {
            let mut transport = Transport::connect(url).await?;
            transport
                .send_json(&AuthFrame {
                    kind: "auth",
                    token,
                })
                .await?;
            let reply = transport.recv_json().await?.ok_or_else(|| {
                ChannelError::HandshakeRejected("connection closed during handshake".into())
            })?;
            Ok::<_, ChannelError>((transport, reply))
        };
        let (transport, reply) = timeout(handshake_timeout, handshake)
            .await
            .map_err(|_| ChannelError::HandshakeTimeout)??;

        let connection_id = parse_handshake_reply(&reply)?;
        debug!(connection_id = %connection_id, "handshake accepted");

        let (sink, stream) = transport.split();
        let (outbound, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound) = mpsc::channel(256);

        let writer = tokio::spawn(writer_loop(sink, outbound_rx));
        let reader = tokio::spawn(reader_loop(stream, inbound_tx));

        Ok(EstablishedChannel::new(
            connection_id,
            outbound,
            inbound,
            vec![writer, reader],
        ))
    }
}

fn parse_handshake_reply(reply: &Value) -> Result<String, ChannelError> {
    match reply.get("type").and_then(Value::as_str) {
        Some("connected") => reply
            .get("connectionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ChannelError::HandshakeRejected("handshake reply missing connectionId".into())
            }),
        Some("rejected") => {
            let reason = reply
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("rejected by server");
            Err(ChannelError::HandshakeRejected(reason.to_string()))
        }
        _ => Err(ChannelError::HandshakeRejected(
            "unexpected handshake reply".into(),
        )),
    }
}

async fn writer_loop(mut sink: WsSink, mut outbound: mpsc::Receiver<ChannelEvent>) {
    use tokio_tungstenite::tungstenite::protocol::Message;

    while let Some(event) = outbound.recv().await {
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!(event = %event.event, error = %e, "unencodable outbound event, dropping");
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}

/// Forwards server frames into the inbound queue in delivery order.
/// Ends — closing the queue — when the transport drops.
async fn reader_loop(mut stream: WsStream, inbound: mpsc::Sender<ChannelEvent>) {
    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::protocol::Message;

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ChannelEvent>(&text) {
                Ok(event) => {
                    if inbound.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "undecodable channel event, skipping"),
            },
            Ok(Message::Close(frame)) => {
                debug!(frame = ?frame, "server closed the channel");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "channel transport error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_handshake_accepted() {
        let reply = json!({"type": "connected", "connectionId": "conn-7"});
        assert_eq!(parse_handshake_reply(&reply).unwrap(), "conn-7");
    }

    #[test]
    fn test_parse_handshake_rejected() {
        let reply = json!({"type": "rejected", "reason": "token expired"});
        match parse_handshake_reply(&reply) {
            Err(ChannelError::HandshakeRejected(reason)) => assert_eq!(reason, "token expired"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_handshake_garbage() {
        let reply = json!({"hello": "world"});
        assert!(matches!(
            parse_handshake_reply(&reply),
            Err(ChannelError::HandshakeRejected(_))
        ));
    }
}
