//! Messages of the `graphql-ws` subprotocol.
//!
//! Every frame is a JSON object with a `type` discriminator. Client kinds
//! this server does not know decode to [`ClientMessage::Unknown`] so they
//! can be ignored rather than treated as errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::envelope::EnvelopeError;

/// Subprotocol name negotiated during the WebSocket handshake.
pub const GRAPHQL_WS: &str = "graphql-ws";

/// Client → server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(default)]
        payload: Option<Value>,
    },
    Start {
        id: String,
        /// Decoded separately so a bad payload can still be answered by id.
        #[serde(default)]
        payload: Value,
    },
    Stop {
        id: String,
    },
    ConnectionTerminate,
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Single entry of an `error` message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,
    ConnectionError {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Data {
        id: String,
        payload: Value,
    },
    Error {
        id: String,
        payload: Vec<ErrorMessage>,
    },
    Complete {
        id: String,
    },
    #[serde(rename = "ka")]
    KeepAlive,
}

impl ServerMessage {
    /// Shorthand for an `error` carrying one message.
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            id: id.into(),
            payload: vec![ErrorMessage::new(message)],
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
