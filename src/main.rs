//! GraphQL transport server.
//!
//! Serves the demo schema over HTTP, plain WebSocket and `graphql-ws`.
//!
//! ```text
//!     POST /            ──▶ single-shot HTTP ──┐
//!     WS   /            ──▶ one-shot WS       ─┼──▶ Executor (async-graphql)
//!     WS   / graphql-ws ──▶ session manager  ──┘
//!     GET  /health      ──▶ liveness
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use gql_transport::config::{load_config, AppConfig};
use gql_transport::lifecycle::{wait_for_signal, Shutdown};
use gql_transport::observability::{logging, metrics};
use gql_transport::{demo, App, HttpServer, SchemaExecutor};

#[derive(Parser)]
#[command(name = "gql-transport")]
#[command(about = "GraphQL over HTTP and WebSocket", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("gql-transport v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        path = %config.graphql.path,
        max_operations = config.graphql.max_operations_per_connection,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let app = App::new(SchemaExecutor::new(demo::schema()))
        .with_config(config.graphql.clone())
        .with_shutdown(shutdown.token());
    let server = HttpServer::new(config, app);
    let shutdown_rx = shutdown.subscribe();

    let mut server_task = tokio::spawn(server.run(listener, shutdown_rx));
    tokio::select! {
        _ = wait_for_signal(&shutdown) => server_task.await??,
        result = &mut server_task => result??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
