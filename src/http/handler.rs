//! Single-shot HTTP handler.
//!
//! One POST carries one operation; the reply is exactly one JSON response.
//!
//! # Status codes
//! - `200`: the result has no errors
//! - `400`: the result has errors, or the body is not a valid envelope
//! - `403`: the access check refused the request
//! - `405`: anything but POST
//! - `413`: the body exceeds its declared length or the size limit

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::SinkExt;
use serde_json::{json, Value};

use crate::executor::{ExecutionResult, Executor};
use crate::hooks::AppHooks;
use crate::http::body::BodyAssembler;
use crate::net::{Connection, ConnectionScope, InboundStream, Outbound, OutboundSink, TransportError};
use crate::observability::metrics;
use crate::protocol::OperationRequest;

pub struct HttpHandler {
    executor: Arc<dyn Executor>,
    hooks: Arc<dyn AppHooks>,
    max_body_bytes: usize,
}

impl HttpHandler {
    pub fn new(executor: Arc<dyn Executor>, hooks: Arc<dyn AppHooks>, max_body_bytes: usize) -> Self {
        Self {
            executor,
            hooks,
            max_body_bytes,
        }
    }

    pub async fn run(&self, connection: Connection) {
        let Connection {
            id,
            scope,
            mut inbound,
            mut outbound,
        } = connection;
        let start = Instant::now();

        let (status, payload) = self.respond(&scope, &mut inbound).await;

        tracing::debug!(connection_id = %id, status = status.as_u16(), "Replying");
        metrics::record_http_request(status.as_u16(), start);
        if let Err(err) = send_json(&mut outbound, status, &payload).await {
            tracing::debug!(connection_id = %id, error = %err, "Client left before the reply");
        }
    }

    async fn respond(&self, scope: &ConnectionScope, inbound: &mut InboundStream) -> (StatusCode, Value) {
        if !scope.method.eq_ignore_ascii_case("POST") {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                error_payload(format!("method {} is not allowed, use POST", scope.method)),
            );
        }

        if !self.hooks.check_access(scope, None).await {
            return (StatusCode::FORBIDDEN, error_payload("access denied"));
        }

        let mut body = BodyAssembler::from_scope(scope, self.max_body_bytes);
        let raw = match body.read_to_end(inbound).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(error = %err, "Failed to read request body");
                let status = if err.is_oversized() {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                return (status, error_payload(err.to_string()));
            }
        };

        let request = match OperationRequest::decode(&raw) {
            Ok(request) => request,
            Err(err) => return (StatusCode::BAD_REQUEST, error_payload(err.to_string())),
        };

        let context = self.hooks.build_context(scope, &request, None).await;
        metrics::record_operation_started("one_shot");
        let result = self
            .executor
            .execute(request, context)
            .await
            .unwrap_or_else(ExecutionResult::from);

        let status = if result.is_ok() {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, result.to_payload())
    }
}

fn error_payload(message: impl Into<String>) -> Value {
    json!({ "errors": [{ "message": message.into() }] })
}

/// Write a complete JSON response with an exact `content-length`.
pub(crate) async fn send_json(
    outbound: &mut OutboundSink,
    status: StatusCode,
    payload: &Value,
) -> Result<(), TransportError> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| TransportError::Other(format!("failed to encode response: {e}")))?;
    let headers = vec![
        ("content-type".to_owned(), "application/json".to_owned()),
        ("content-length".to_owned(), body.len().to_string()),
    ];
    outbound
        .send(Outbound::HttpResponseStart { status, headers })
        .await?;
    outbound
        .send(Outbound::HttpResponseBody {
            body: Bytes::from(body),
            more_body: false,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::executor::SchemaExecutor;
    use crate::hooks::PermitAll;
    use crate::net::Inbound;

    fn handler() -> HttpHandler {
        HttpHandler::new(
            Arc::new(SchemaExecutor::new(demo::schema())),
            Arc::new(PermitAll),
            1024,
        )
    }

    async fn exchange(scope: ConnectionScope, events: Vec<Inbound>) -> (StatusCode, Value) {
        let (connection, mut peer) = Connection::pair(scope, 8);
        for event in events {
            peer.send(event).await.unwrap();
        }
        handler().run(connection).await;

        let Some(Outbound::HttpResponseStart { status, .. }) = peer.recv().await else {
            panic!("expected a response start");
        };
        let Some(Outbound::HttpResponseBody { body, more_body }) = peer.recv().await else {
            panic!("expected a response body");
        };
        assert!(!more_body);
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn get_is_not_allowed() {
        let (status, payload) = exchange(ConnectionScope::http("GET", "/"), vec![]).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(payload["errors"].is_array());
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let body = format!(r#"{{"query": "{{ aNum }}", "pad": "{}"}}"#, "x".repeat(2048));
        let (status, _) = exchange(
            ConnectionScope::http("POST", "/"),
            vec![Inbound::HttpRequest {
                body: Bytes::from(body),
                more_body: false,
            }],
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn missing_query_is_400() {
        let (status, payload) = exchange(
            ConnectionScope::http("POST", "/"),
            vec![Inbound::HttpRequest {
                body: Bytes::from_static(br#"{"variables": {}}"#),
                more_body: false,
            }],
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            payload["errors"][0]["message"],
            "malformed envelope: missing required field \"query\""
        );
    }
}
