//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use gql_transport::config::{AppConfig, GraphqlConfig};
use gql_transport::lifecycle::Shutdown;
use gql_transport::net::PeerEnd;
use gql_transport::{demo, App, AppHooks, Connection, ConnectionScope, HttpServer, Inbound, Outbound, SchemaExecutor};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// App over the demo schema with default hooks.
pub fn demo_app() -> App {
    App::new(SchemaExecutor::new(demo::schema()))
}

pub fn demo_app_with(config: GraphqlConfig) -> App {
    demo_app().with_config(config)
}

/// Refuses every connection.
pub struct DenyAll;

#[async_trait]
impl AppHooks for DenyAll {
    async fn check_access(&self, _scope: &ConnectionScope, _init_payload: Option<&Value>) -> bool {
        false
    }
}

/// Admits `graphql-ws` sessions whose init payload carries `{"token": "secret"}`.
pub struct RequireToken;

#[async_trait]
impl AppHooks for RequireToken {
    async fn check_access(&self, _scope: &ConnectionScope, init_payload: Option<&Value>) -> bool {
        init_payload.and_then(|p| p.get("token")) == Some(&json!("secret"))
    }
}

/// A connection being served by an [`App`] on a background task.
pub struct TestClient {
    pub peer: PeerEnd,
    pub handle: JoinHandle<()>,
}

impl TestClient {
    pub fn spawn(app: &App, scope: ConnectionScope) -> Self {
        let (connection, peer) = Connection::pair(scope, 64);
        let app = app.clone();
        let handle = tokio::spawn(async move { app.handle(connection).await });
        Self { peer, handle }
    }

    pub async fn send(&self, event: Inbound) {
        self.peer.send(event).await.expect("handler stopped reading");
    }

    pub async fn send_json(&self, value: Value) {
        self.send(Inbound::WebsocketText(value.to_string())).await;
    }

    /// Next outbound command, failing the test after [`TIMEOUT`].
    pub async fn next(&mut self) -> Outbound {
        tokio::time::timeout(TIMEOUT, self.peer.recv())
            .await
            .expect("timed out waiting for the handler")
            .expect("handler closed the connection")
    }

    /// Next outbound text frame, parsed as JSON.
    pub async fn next_json(&mut self) -> Value {
        match self.next().await {
            Outbound::WebsocketText(text) => serde_json::from_str(&text).expect("frame is JSON"),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    /// Whatever the handler sends within `wait`, if anything.
    pub async fn maybe_next(&mut self, wait: Duration) -> Option<Outbound> {
        tokio::time::timeout(wait, self.peer.recv()).await.ok().flatten()
    }

    /// Wait for the handler to return and for every writer to go away.
    pub async fn finished(mut self) -> Vec<Outbound> {
        tokio::time::timeout(TIMEOUT, &mut self.handle)
            .await
            .expect("handler did not finish")
            .expect("handler panicked");
        let mut rest = Vec::new();
        while let Some(command) = tokio::time::timeout(TIMEOUT, self.peer.recv())
            .await
            .expect("outbound channel still open")
        {
            rest.push(command);
        }
        rest
    }
}

pub fn graphql_ws_scope() -> ConnectionScope {
    ConnectionScope::websocket("/").with_subprotocol("graphql-ws")
}

/// Open a `graphql-ws` session and complete the handshake.
pub async fn open_session(app: &App) -> TestClient {
    let mut client = TestClient::spawn(app, graphql_ws_scope());
    client.send(Inbound::WebsocketConnect).await;
    assert_eq!(
        client.next().await,
        Outbound::WebsocketAccept {
            subprotocol: Some("graphql-ws".into())
        }
    );
    client.send_json(json!({"type": "connection_init"})).await;
    assert_eq!(client.next_json().await, json!({"type": "connection_ack"}));
    client
}

pub fn start(id: &str, query: &str) -> Value {
    json!({"type": "start", "id": id, "payload": {"query": query}})
}

pub fn stop(id: &str) -> Value {
    json!({"type": "stop", "id": id})
}

/// A real server on an ephemeral port.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

pub async fn start_server() -> RunningServer {
    let mut config = AppConfig::default();
    config.timeouts.shutdown_grace_secs = 2;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let app = demo_app_with(config.graphql.clone()).with_shutdown(shutdown.token());
    let server = HttpServer::new(config, app);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningServer {
        addr,
        shutdown,
        handle,
    }
}
