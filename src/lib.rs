//! GraphQL transport library.
//!
//! Serves GraphQL over single-shot HTTP, one-shot WebSocket and the
//! multiplexed `graphql-ws` subprotocol on top of any [`Executor`].

pub mod app;
pub mod config;
pub mod context;
pub mod demo;
pub mod executor;
pub mod hooks;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod session;

pub use app::App;
pub use config::AppConfig;
pub use context::RequestContext;
pub use executor::{Execution, ExecutionResult, Executor, ExecutorError, SchemaExecutor};
pub use hooks::{AppHooks, PermitAll};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use net::{Connection, ConnectionScope, Inbound, Outbound};
