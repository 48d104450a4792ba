//! graphql-ws session manager.
//!
//! One session owns one multiplexed connection. The session loop reads
//! client messages in order; every live subscription runs as its own task
//! and writes through the shared [`Outbox`].
//!
//! # Data Flow
//! ```text
//! inbound events
//!     → SubscriptionSession::run (single reader)
//!         connection_init → check_access → connection_ack | connection_error + close
//!         start           → executor.invoke
//!                             → one result: data | error
//!                             → stream:     registry entry → operation task
//!         stop            → cancel registry entry
//!         terminate       → close
//!     disconnect / shutdown → cancel all → wait for tasks
//!
//! operation tasks → Outbox (one send at a time) → outbound sink
//! ```

pub mod outbox;
pub mod registry;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::executor::{Execution, ExecutionResult, Executor};
use crate::hooks::AppHooks;
use crate::net::{ConnectionId, ConnectionScope, Inbound, InboundStream, Outbound, OutboundSink};
use crate::observability::metrics;
use crate::protocol::{ClientMessage, EnvelopeError, OperationRequest, ServerMessage, GRAPHQL_WS};

pub use outbox::Outbox;
pub use registry::{OperationHandle, Registry};

/// Default cap on concurrently registered operations.
pub const DEFAULT_MAX_OPERATIONS: usize = 100;

/// How long closing waits for the outbound side to take the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// How long teardown waits for cancelled operations before aborting them.
const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Where a session is in its lifetime.
///
/// A successful `connection_init` moves straight from `AwaitingInit` to
/// `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInit,
    Active,
    Closing,
    Closed,
}

type Flow = ControlFlow<()>;

pub struct SubscriptionSession {
    connection_id: ConnectionId,
    scope: ConnectionScope,
    state: SessionState,
    accepted: bool,
    connection_params: Option<Value>,
    executor: Arc<dyn Executor>,
    hooks: Arc<dyn AppHooks>,
    registry: Arc<Registry>,
    cancelled: Vec<OperationHandle>,
    outbox: Outbox,
    tasks: TaskTracker,
    max_operations: usize,
    shutdown: CancellationToken,
}

impl SubscriptionSession {
    pub fn new(
        connection_id: ConnectionId,
        scope: ConnectionScope,
        outbound: OutboundSink,
        executor: Arc<dyn Executor>,
        hooks: Arc<dyn AppHooks>,
    ) -> Self {
        Self {
            connection_id,
            scope,
            state: SessionState::AwaitingInit,
            accepted: false,
            connection_params: None,
            executor,
            hooks,
            registry: Arc::new(Registry::new()),
            cancelled: Vec::new(),
            outbox: Outbox::new(outbound),
            tasks: TaskTracker::new(),
            max_operations: DEFAULT_MAX_OPERATIONS,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_max_operations(mut self, max_operations: usize) -> Self {
        self.max_operations = max_operations;
        self
    }

    /// Close the session when `shutdown` is cancelled, as if the client
    /// had disconnected.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Drive the session until the client leaves, terminates, is refused,
    /// or the application shuts down. Every operation task has finished
    /// when this returns.
    pub async fn run(mut self, mut inbound: InboundStream) {
        tracing::debug!(connection_id = %self.connection_id, "graphql-ws session started");
        let shutdown = self.shutdown.clone();

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::debug!("Closing session for shutdown");
                    self.close().await;
                    break;
                }
                event = inbound.next() => event,
            };

            let Some(event) = event else {
                break;
            };

            // A send to a stalled peer must not hold off shutdown.
            let flow = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                flow = self.on_event(event) => Some(flow),
            };
            match flow {
                Some(ControlFlow::Continue(())) => {}
                Some(ControlFlow::Break(())) => break,
                None => {
                    tracing::debug!("Closing session for shutdown");
                    self.close().await;
                    break;
                }
            }
        }

        self.teardown().await;
    }

    async fn on_event(&mut self, event: Inbound) -> Flow {
        match event {
            Inbound::WebsocketConnect => self.on_connect().await,
            Inbound::WebsocketText(text) => self.on_text(&text).await,
            Inbound::WebsocketBinary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.on_text(text).await,
                Err(_) => {
                    let err = EnvelopeError::InvalidField("frame");
                    self.on_malformed(None, err).await
                }
            },
            Inbound::WebsocketDisconnect | Inbound::HttpDisconnect => ControlFlow::Break(()),
            Inbound::HttpRequest { .. } => {
                tracing::debug!("Ignoring HTTP body event on a WebSocket session");
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_connect(&mut self) -> Flow {
        if self.accepted {
            return ControlFlow::Continue(());
        }
        self.accepted = true;
        let accept = Outbound::WebsocketAccept {
            subprotocol: Some(GRAPHQL_WS.to_owned()),
        };
        self.emit(accept).await
    }

    async fn on_text(&mut self, text: &str) -> Flow {
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(err) => return self.on_malformed(frame_id(text), err).await,
        };

        match message {
            ClientMessage::ConnectionInit { payload } => self.on_init(payload).await,
            ClientMessage::Start { id, payload } => self.on_start(id, payload).await,
            ClientMessage::Stop { id } => {
                self.on_stop(&id);
                ControlFlow::Continue(())
            }
            ClientMessage::ConnectionTerminate => {
                tracing::debug!("Client terminated the session");
                self.close().await;
                ControlFlow::Break(())
            }
            ClientMessage::Unknown => {
                tracing::debug!("Ignoring message of unknown type");
                ControlFlow::Continue(())
            }
        }
    }

    /// An undecodable frame fails the handshake before `connection_init`
    /// and only the operation it names afterwards.
    async fn on_malformed(&mut self, id: Option<String>, err: EnvelopeError) -> Flow {
        if self.state == SessionState::AwaitingInit {
            tracing::warn!(error = %err, "Malformed message during handshake");
            let refusal = ServerMessage::ConnectionError {
                payload: Some(json!({ "message": err.to_string() })),
            };
            let _ = self.send(&refusal).await;
            self.close().await;
            return ControlFlow::Break(());
        }

        match id {
            Some(id) => self.send(&ServerMessage::error(id, err.to_string())).await,
            None => {
                tracing::warn!(error = %err, "Dropping malformed message without an id");
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_init(&mut self, payload: Option<Value>) -> Flow {
        if self.state == SessionState::Active {
            return self.send(&ServerMessage::ConnectionAck).await;
        }

        if !self.hooks.check_access(&self.scope, payload.as_ref()).await {
            tracing::info!(connection_id = %self.connection_id, "Access denied");
            let refusal = ServerMessage::ConnectionError {
                payload: Some(json!({ "message": "access denied" })),
            };
            let _ = self.send(&refusal).await;
            self.close().await;
            return ControlFlow::Break(());
        }

        self.connection_params = payload;
        self.state = SessionState::Active;
        self.send(&ServerMessage::ConnectionAck).await
    }

    async fn on_start(&mut self, id: String, payload: Value) -> Flow {
        if self.state != SessionState::Active {
            return self
                .send(&ServerMessage::error(id, "connection_init has not been acknowledged"))
                .await;
        }

        let request = match OperationRequest::from_value(payload) {
            Ok(request) => request,
            Err(err) => return self.send(&ServerMessage::error(id, err.to_string())).await,
        };

        if let Some(previous) = self.registry.remove(&id) {
            tracing::debug!(operation_id = %id, "Replacing live operation");
            previous.cancel_and_wait().await;
        }

        if self.registry.len() >= self.max_operations {
            tracing::warn!(operation_id = %id, limit = self.max_operations, "Operation limit reached");
            let message = format!(
                "too many operations: at most {} may run on one connection",
                self.max_operations
            );
            return self.send(&ServerMessage::error(id, message)).await;
        }

        let context = self
            .hooks
            .build_context(&self.scope, &request, self.connection_params.as_ref())
            .await;

        match self.executor.invoke(request, context).await {
            Ok(Execution::Response(result)) => {
                metrics::record_operation_started("one_shot");
                self.send(&result_message(id, &result)).await
            }
            Ok(Execution::Stream(stream)) => {
                metrics::record_operation_started("stream");
                self.spawn_stream(id, stream);
                ControlFlow::Continue(())
            }
            Err(err) => {
                tracing::warn!(operation_id = %id, error = %err, "Executor failed");
                self.send(&ServerMessage::error(id, err.to_string())).await
            }
        }
    }

    /// Register the operation, then spawn its task. The entry exists
    /// before the task can emit anything.
    fn spawn_stream(&self, id: String, stream: BoxStream<'static, ExecutionResult>) {
        let (token, generation) = self.registry.reserve(&id);
        let span = tracing::debug_span!("operation", operation_id = %id);
        let task = self.tasks.spawn(
            forward_stream(
                id.clone(),
                generation,
                stream,
                token,
                self.outbox.clone(),
                Arc::clone(&self.registry),
            )
            .instrument(span),
        );
        self.registry.attach(&id, generation, task);
    }

    fn on_stop(&self, id: &str) {
        match self.registry.remove(id) {
            Some(handle) => {
                tracing::debug!(operation_id = %id, "Stopping operation");
                handle.cancel();
            }
            None => tracing::trace!(operation_id = %id, "Stop for an operation that is not live"),
        }
    }

    async fn send(&self, message: &ServerMessage) -> Flow {
        match self.outbox.send_message(message).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                tracing::debug!(error = %err, "Outbound channel closed");
                ControlFlow::Break(())
            }
        }
    }

    async fn emit(&self, command: Outbound) -> Flow {
        match self.outbox.send(command).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                tracing::debug!(error = %err, "Outbound channel closed");
                ControlFlow::Break(())
            }
        }
    }

    /// Cancel every live operation, then send the close frame.
    ///
    /// Cancelled operations release the outbox, so the close frame only
    /// waits on the peer, and at most [`CLOSE_GRACE`].
    async fn close(&mut self) {
        self.state = SessionState::Closing;
        self.cancel_operations();
        let close = self.outbox.send(Outbound::WebsocketClose);
        if tokio::time::timeout(CLOSE_GRACE, close).await.is_err() {
            tracing::debug!("Peer stopped reading; closing without a close frame");
        }
    }

    fn cancel_operations(&mut self) {
        self.cancelled.extend(self.registry.cancel_all());
    }

    async fn teardown(&mut self) {
        self.state = SessionState::Closing;
        self.cancel_operations();
        self.tasks.close();

        if tokio::time::timeout(TEARDOWN_GRACE, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                connection_id = %self.connection_id,
                remaining = self.tasks.len(),
                "Aborting operations that outlived cancellation"
            );
            for handle in &self.cancelled {
                handle.abort();
            }
            self.tasks.wait().await;
        }

        self.state = SessionState::Closed;
        tracing::debug!(
            connection_id = %self.connection_id,
            cancelled = self.cancelled.len(),
            "graphql-ws session closed"
        );
    }
}

/// Body of an operation task: forward every item as `data`, then
/// `complete` once the source is exhausted. Cancellation ends the task
/// silently.
async fn forward_stream(
    id: String,
    generation: u64,
    mut stream: BoxStream<'static, ExecutionResult>,
    token: CancellationToken,
    outbox: Outbox,
    registry: Arc<Registry>,
) {
    let outcome = loop {
        let item = tokio::select! {
            biased;
            _ = token.cancelled() => break "cancelled",
            item = stream.next() => item,
        };

        let (message, last) = match item {
            Some(result) => (
                ServerMessage::Data {
                    id: id.clone(),
                    payload: result.to_payload(),
                },
                false,
            ),
            None => (ServerMessage::Complete { id: id.clone() }, true),
        };

        match outbox.send_unless_cancelled(&token, &message).await {
            Ok(true) if last => break "completed",
            Ok(true) => {}
            Ok(false) => break "cancelled",
            Err(err) => {
                tracing::debug!(error = %err, "Dropping operation after send failure");
                break "failed";
            }
        }
    };

    registry.finish(&id, generation);
    metrics::record_stream_finished(outcome);
    tracing::debug!(outcome, "Operation finished");
}

fn result_message(id: String, result: &ExecutionResult) -> ServerMessage {
    if result.is_ok() {
        ServerMessage::Data {
            id,
            payload: result.to_payload(),
        }
    } else {
        ServerMessage::Error {
            id,
            payload: result.error_messages(),
        }
    }
}

/// Best-effort `id` of a frame that failed to decode as a client message.
fn frame_id(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("id")?.as_str().map(str::to_owned)
}
