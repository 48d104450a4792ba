//! Shared writer for a session's outbound channel.

use std::sync::Arc;

use futures_util::SinkExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::net::{Outbound, OutboundSink, TransportError};
use crate::protocol::ServerMessage;

/// Serializes writes from the session loop and every operation task.
///
/// Messages are encoded before the lock is taken. The lock is held for
/// exactly one send.
#[derive(Clone)]
pub struct Outbox {
    sink: Arc<Mutex<OutboundSink>>,
}

impl Outbox {
    pub fn new(sink: OutboundSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    pub async fn send(&self, command: Outbound) -> Result<(), TransportError> {
        self.sink.lock().await.send(command).await
    }

    pub async fn send_message(&self, message: &ServerMessage) -> Result<(), TransportError> {
        let text = encode(message)?;
        self.send(Outbound::WebsocketText(text)).await
    }

    /// Send `message` unless `token` is cancelled first.
    ///
    /// Returns whether the message went out. Cancellation also abandons a
    /// send that is waiting for the lock or for room in the sink, so a
    /// cancelled operation never writes after the cancelling side moved on
    /// and never holds the lock against a reader that stopped draining.
    pub async fn send_unless_cancelled(
        &self,
        token: &CancellationToken,
        message: &ServerMessage,
    ) -> Result<bool, TransportError> {
        let text = encode(message)?;
        let send = async {
            let mut sink = self.sink.lock().await;
            if token.is_cancelled() {
                return Ok(false);
            }
            sink.send(Outbound::WebsocketText(text)).await.map(|()| true)
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Ok(false),
            sent = send => sent,
        }
    }
}

fn encode(message: &ServerMessage) -> Result<String, TransportError> {
    message
        .encode()
        .map_err(|e| TransportError::Other(format!("failed to encode message: {e}")))
}
