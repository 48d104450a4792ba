//! Application facade: routes each connection to its transport handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::GraphqlConfig;
use crate::executor::Executor;
use crate::hooks::{AppHooks, PermitAll};
use crate::http::handler::HttpHandler;
use crate::http::websocket::WebsocketHandler;
use crate::net::{Connection, ConnectionTracker, TransportKind};
use crate::protocol::GRAPHQL_WS;
use crate::session::SubscriptionSession;

/// Entry point for hosts.
///
/// Cheap to clone; every clone shares the executor, hooks, connection
/// tracker and shutdown token.
#[derive(Clone)]
pub struct App {
    executor: Arc<dyn Executor>,
    hooks: Arc<dyn AppHooks>,
    config: GraphqlConfig,
    connections: ConnectionTracker,
    shutdown: CancellationToken,
}

impl App {
    pub fn new(executor: impl Executor) -> Self {
        Self {
            executor: Arc::new(executor),
            hooks: Arc::new(PermitAll),
            config: GraphqlConfig::default(),
            connections: ConnectionTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: impl AppHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_config(mut self, config: GraphqlConfig) -> Self {
        self.config = config;
        self
    }

    /// Tie live graphql-ws sessions to an external shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &GraphqlConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// Close every live graphql-ws session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Serve one connection until its exchange is over.
    pub async fn handle(&self, connection: Connection) {
        let kind = connection.scope.kind;
        let graphql_ws = kind == TransportKind::Websocket && connection.scope.offers_subprotocol(GRAPHQL_WS);
        let _guard = self.connections.track(connection.id, kind);

        let span = tracing::info_span!(
            "connection",
            connection_id = %connection.id,
            transport = %kind,
            subprotocol = if graphql_ws { GRAPHQL_WS } else { "none" },
        );

        async {
            match kind {
                TransportKind::Http => {
                    HttpHandler::new(
                        Arc::clone(&self.executor),
                        Arc::clone(&self.hooks),
                        self.config.max_body_bytes,
                    )
                    .run(connection)
                    .await
                }
                TransportKind::Websocket if graphql_ws => {
                    let Connection {
                        id,
                        scope,
                        inbound,
                        outbound,
                    } = connection;
                    SubscriptionSession::new(
                        id,
                        scope,
                        outbound,
                        Arc::clone(&self.executor),
                        Arc::clone(&self.hooks),
                    )
                    .with_max_operations(self.config.max_operations_per_connection)
                    .with_shutdown(self.shutdown.child_token())
                    .run(inbound)
                    .await
                }
                TransportKind::Websocket => {
                    WebsocketHandler::new(Arc::clone(&self.executor), Arc::clone(&self.hooks))
                        .run(connection)
                        .await
                }
            }
        }
        .instrument(span)
        .await
    }
}
