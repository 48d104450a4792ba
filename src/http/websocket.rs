//! One-shot WebSocket handler.
//!
//! Plain WebSocket without a negotiated subprotocol: every text frame is an
//! envelope, every envelope gets exactly one reply. Requests are handled
//! strictly one after another.
//!
//! # Data Flow
//! ```text
//! connect → check_access → accept | close
//! frame   → decode → execute → {data | errors, id?}
//! ```

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;

use crate::executor::{ExecutionResult, Executor};
use crate::hooks::AppHooks;
use crate::net::{Connection, ConnectionScope, Inbound, Outbound};
use crate::observability::metrics;
use crate::protocol::OperationRequest;

pub struct WebsocketHandler {
    executor: Arc<dyn Executor>,
    hooks: Arc<dyn AppHooks>,
}

impl WebsocketHandler {
    pub fn new(executor: Arc<dyn Executor>, hooks: Arc<dyn AppHooks>) -> Self {
        Self { executor, hooks }
    }

    pub async fn run(&self, connection: Connection) {
        let Connection {
            id,
            scope,
            mut inbound,
            mut outbound,
        } = connection;
        let mut accepted = false;

        while let Some(event) = inbound.next().await {
            let raw = match event {
                Inbound::WebsocketConnect if !accepted => {
                    if !self.hooks.check_access(&scope, None).await {
                        tracing::info!(connection_id = %id, "Access denied");
                        let _ = outbound.send(Outbound::WebsocketClose).await;
                        return;
                    }
                    accepted = true;
                    if outbound
                        .send(Outbound::WebsocketAccept { subprotocol: None })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    continue;
                }
                Inbound::WebsocketText(text) => text.into_bytes(),
                Inbound::WebsocketBinary(bytes) => bytes.to_vec(),
                event if event.is_disconnect() => break,
                _ => continue,
            };

            if !accepted {
                tracing::debug!(connection_id = %id, "Ignoring frame before accept");
                continue;
            }

            let reply = self.reply(&scope, &raw).await;
            let text = match serde_json::to_string(&reply) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to encode reply");
                    continue;
                }
            };
            if outbound.send(Outbound::WebsocketText(text)).await.is_err() {
                break;
            }
        }

        tracing::debug!(connection_id = %id, "WebSocket client left");
    }

    async fn reply(&self, scope: &ConnectionScope, raw: &[u8]) -> Value {
        let (result, id) = match OperationRequest::decode(raw) {
            Ok(request) => {
                let id = request.extensions.get("id").cloned();
                let context = self.hooks.build_context(scope, &request, None).await;
                metrics::record_operation_started("one_shot");
                let result = self
                    .executor
                    .execute(request, context)
                    .await
                    .unwrap_or_else(ExecutionResult::from);
                (result, id)
            }
            Err(err) => (ExecutionResult::error(err.to_string()), raw_id(raw)),
        };

        let mut reply = result.to_payload();
        if let (Some(id), Value::Object(fields)) = (id, &mut reply) {
            fields.insert("id".to_owned(), id);
        }
        reply
    }
}

/// `id` of a frame that is JSON but not a valid envelope.
fn raw_id(raw: &[u8]) -> Option<Value> {
    let value: Value = serde_json::from_slice(raw).ok()?;
    value.get("id").cloned()
}
