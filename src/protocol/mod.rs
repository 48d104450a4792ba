//! Wire formats.
//!
//! - envelope.rs: the `{query, variables, operationName}` object shared by all transports
//! - graphql_ws.rs: the multiplexed `graphql-ws` message kinds

pub mod envelope;
pub mod graphql_ws;

pub use envelope::{EnvelopeError, OperationRequest};
pub use graphql_ws::{ClientMessage, ErrorMessage, ServerMessage, GRAPHQL_WS};
