//! Transport-agnostic connection layer.
//!
//! # Data Flow
//! ```text
//! Host environment (axum, tests, anything else)
//!     → scope.rs (what kind of connection, headers, subprotocols)
//!     → message.rs (inbound events / outbound commands)
//!     → connection.rs (scope + inbound stream + outbound sink, lifecycle tracking)
//!     → Hand off to the application facade
//! ```
//!
//! # Design Decisions
//! - Handlers never see sockets, only `Inbound` events and `Outbound` commands
//! - The outbound side is a `Sink` so a single writer can be guarded per connection
//! - Each connection is tracked for graceful shutdown

pub mod connection;
pub mod message;
pub mod scope;

pub use connection::{Connection, ConnectionGuard, ConnectionId, ConnectionTracker, PeerEnd};
pub use message::{Inbound, InboundStream, Outbound, OutboundSink, TransportError};
pub use scope::{ConnectionScope, TransportKind};
