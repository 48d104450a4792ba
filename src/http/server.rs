//! HTTP server setup and the axum host bridge.
//!
//! # Responsibilities
//! - Create the Axum Router with the GraphQL and health routes
//! - Wire up middleware (tracing, request ID, timeout)
//! - Turn each request or WebSocket into a [`Connection`] for the [`App`]
//! - Close sessions and drain connections on shutdown

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, FromRequestParts, Request, State,
    },
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::App;
use crate::config::AppConfig;
use crate::net::{Connection, ConnectionScope, Inbound, Outbound, PeerEnd};
use crate::protocol::GRAPHQL_WS;

const X_REQUEST_ID: &str = "x-request-id";

/// HTTP server hosting one [`App`].
pub struct HttpServer {
    router: Router,
    app: App,
    config: AppConfig,
}

impl HttpServer {
    pub fn new(config: AppConfig, app: App) -> Self {
        let router = Self::build_router(&config, app.clone());
        Self { router, app, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, app: App) -> Router {
        Router::new()
            .route(&config.graphql.path, any(graphql_handler))
            .route("/health", get(health_handler))
            .with_state(app)
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID)))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static(X_REQUEST_ID),
                MakeRequestUuid,
            ))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then close sessions and drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            path = %self.config.graphql.path,
            "HTTP server starting"
        );

        let app = self.app.clone();
        let signal = async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            app.shutdown();
        };

        let service = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, service)
            .with_graceful_shutdown(signal)
            .await?;

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        if self.app.connections().wait_for_drain(grace).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = self.app.connections().active_count(),
                "Shutdown grace period elapsed with connections still open"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

async fn health_handler(State(app): State<App>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": app.connections().active_count(),
    }))
}

/// Single route for every transport: upgrades become WebSocket
/// connections, everything else is an HTTP exchange.
async fn graphql_handler(State(app): State<App>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    if is_upgrade(&parts.headers) {
        return match WebSocketUpgrade::from_request_parts(&mut parts, &app).await {
            Ok(upgrade) => upgrade_websocket(app, &parts, upgrade),
            Err(rejection) => rejection.into_response(),
        };
    }

    let scope = scope_from_parts(ConnectionScope::http(parts.method.as_str(), parts.uri.path()), &parts);
    serve_http(app, scope, body).await
}

fn is_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn scope_from_parts(mut scope: ConnectionScope, parts: &Parts) -> ConnectionScope {
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            scope = scope.with_header(name.as_str(), value);
        }
    }
    if let Some(query) = parts.uri.query() {
        scope = scope.with_query_string(query);
    }
    if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        scope = scope.with_metadata("client", peer.to_string());
    }
    scope.with_metadata("http_version", format!("{:?}", parts.version))
}

async fn serve_http(app: App, scope: ConnectionScope, body: Body) -> Response {
    let buffer = app.config().outbound_buffer;
    let (connection, peer) = Connection::pair(scope, buffer);
    let PeerEnd {
        inbound: events,
        outbound: mut commands,
    } = peer;

    let reader = tokio::spawn(async move {
        let mut chunks = body.into_data_stream();
        while let Some(chunk) = chunks.next().await {
            let event = match chunk {
                Ok(body) => Inbound::HttpRequest {
                    body,
                    more_body: true,
                },
                Err(err) => {
                    tracing::debug!(error = %err, "Request body failed");
                    let _ = events.send(Inbound::HttpDisconnect).await;
                    return;
                }
            };
            if events.send(event).await.is_err() {
                return;
            }
        }
        let _ = events
            .send(Inbound::HttpRequest {
                body: Bytes::new(),
                more_body: false,
            })
            .await;
    });

    let collect = async {
        let mut start = None;
        let mut body = BytesMut::new();
        while let Some(command) = commands.recv().await {
            match command {
                Outbound::HttpResponseStart { status, headers } => start = Some((status, headers)),
                Outbound::HttpResponseBody {
                    body: chunk,
                    more_body,
                } => {
                    body.extend_from_slice(&chunk);
                    if !more_body {
                        break;
                    }
                }
                other => tracing::debug!(?other, "Ignoring non-HTTP command"),
            }
        }
        (start, body.freeze())
    };

    let ((), (start, body)) = tokio::join!(app.handle(connection), collect);
    reader.abort();

    let Some((status, headers)) = start else {
        tracing::error!("Handler finished without a response");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    for (name, value) in headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Dropping invalid response header"),
        }
    }
    response
}

fn upgrade_websocket(app: App, parts: &Parts, upgrade: WebSocketUpgrade) -> Response {
    let mut scope = ConnectionScope::websocket(parts.uri.path());
    if let Some(offered) = parts
        .headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
    {
        for protocol in offered.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            scope = scope.with_subprotocol(protocol);
        }
    }
    let scope = scope_from_parts(scope, parts);

    let upgrade = if scope.offers_subprotocol(GRAPHQL_WS) {
        upgrade.protocols([GRAPHQL_WS])
    } else {
        upgrade
    };

    upgrade.on_upgrade(move |socket| serve_websocket(app, scope, socket))
}

async fn serve_websocket(app: App, scope: ConnectionScope, socket: WebSocket) {
    let buffer = app.config().outbound_buffer;
    let (connection, peer) = Connection::pair(scope, buffer);
    let PeerEnd {
        inbound: events,
        outbound: mut commands,
    } = peer;
    let (mut sink, mut stream) = socket.split();

    let reader = tokio::spawn(async move {
        if events.send(Inbound::WebsocketConnect).await.is_err() {
            return;
        }
        while let Some(message) = stream.next().await {
            let event = match message {
                Ok(Message::Text(text)) => Inbound::WebsocketText(text.as_str().to_owned()),
                Ok(Message::Binary(bytes)) => Inbound::WebsocketBinary(bytes),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            if events.send(event).await.is_err() {
                return;
            }
        }
        let _ = events.send(Inbound::WebsocketDisconnect).await;
    });

    // Owns the receiver: once the writer stops, session sends fail fast.
    let writer = async move {
        while let Some(command) = commands.recv().await {
            match command {
                Outbound::WebsocketText(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::WebsocketClose => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                // The upgrade already completed, with the subprotocol chosen above.
                Outbound::WebsocketAccept { .. } => {}
                other => tracing::debug!(?other, "Ignoring non-WebSocket command"),
            }
        }
        let _ = sink.close().await;
    };

    tokio::join!(app.handle(connection), writer);
    reader.abort();
}
