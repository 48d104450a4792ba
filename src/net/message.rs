//! Events flowing in and out of a connection.

use std::pin::Pin;

use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::Sink;
use thiserror::Error;

/// Event delivered by the host to a connection handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A piece of an HTTP request body. `more_body == false` marks the last one.
    HttpRequest { body: Bytes, more_body: bool },
    /// The HTTP client went away before the exchange finished.
    HttpDisconnect,
    /// A WebSocket client asks to be accepted.
    WebsocketConnect,
    WebsocketText(String),
    WebsocketBinary(Bytes),
    WebsocketDisconnect,
}

impl Inbound {
    /// Whether this event ends the connection from the client side.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Inbound::HttpDisconnect | Inbound::WebsocketDisconnect)
    }
}

/// Command issued by a connection handler to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    HttpResponseStart {
        status: StatusCode,
        headers: Vec<(String, String)>,
    },
    HttpResponseBody { body: Bytes, more_body: bool },
    /// Accept a WebSocket, optionally confirming one of the offered subprotocols.
    WebsocketAccept { subprotocol: Option<String> },
    WebsocketText(String),
    WebsocketClose,
}

/// Failure to hand a command to the host.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host side of the connection no longer accepts commands.
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Other(String),
}

/// Ordered source of inbound events. End of stream means disconnect.
pub type InboundStream = BoxStream<'static, Inbound>;

/// Single ordered destination for outbound commands.
pub type OutboundSink = Pin<Box<dyn Sink<Outbound, Error = TransportError> + Send>>;
