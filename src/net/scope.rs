//! Connection descriptors.

use serde::{Deserialize, Serialize};

/// Declared transport of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Plain request/response.
    Http,
    /// Long-lived bidirectional message channel.
    Websocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::Websocket => "websocket",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about a connection before its first message.
///
/// Headers keep the case and order they arrived in; lookups through
/// [`ConnectionScope::header`] are case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionScope {
    pub kind: TransportKind,
    /// HTTP method of the request (or of the upgrade request).
    pub method: String,
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query_string: String,
    pub headers: Vec<(String, String)>,
    /// Subprotocols offered by a WebSocket client.
    pub subprotocols: Vec<String>,
    /// Arbitrary host-supplied metadata (peer address, HTTP version, ...).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ConnectionScope {
    /// Scope for a plain HTTP request.
    pub fn http(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Http,
            method: method.into(),
            path: path.into(),
            query_string: String::new(),
            headers: Vec::new(),
            subprotocols: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Scope for a WebSocket connection.
    pub fn websocket(path: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Websocket,
            ..Self::http("GET", path)
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }

    pub fn with_query_string(mut self, query_string: impl Into<String>) -> Self {
        self.query_string = query_string.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn offers_subprotocol(&self, protocol: &str) -> bool {
        self.subprotocols.iter().any(|p| p == protocol)
    }
}
