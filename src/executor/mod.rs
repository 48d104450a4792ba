//! Executor adapter.
//!
//! The GraphQL engine is opaque to the transports. They only need to know
//! whether an operation produced one result or a live stream of them.
//!
//! # Data Flow
//! ```text
//! OperationRequest + RequestContext
//!     → Executor::execute (single-shot transports, never streams)
//!     → Executor::invoke  (graphql-ws sessions)
//!         → Execution::Response(ExecutionResult)
//!         → Execution::Stream(items over time)
//! ```

pub mod result;
pub mod schema;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::context::RequestContext;
use crate::protocol::OperationRequest;

pub use result::{ExecutionResult, GraphqlError};
pub use schema::{classify, OperationKind, SchemaExecutor};

/// The executor could not run the operation at all.
///
/// Validation and resolver failures are not this: they come back inside
/// an [`ExecutionResult`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    #[error("execution failed: {0}")]
    Failed(String),
}

impl From<ExecutorError> for ExecutionResult {
    fn from(err: ExecutorError) -> Self {
        ExecutionResult::error(err.to_string())
    }
}

/// What invoking an operation produced.
pub enum Execution {
    /// Terminal result of a query or mutation.
    Response(ExecutionResult),
    /// Live results of a subscription, until the source is exhausted.
    Stream(BoxStream<'static, ExecutionResult>),
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Execution::Response(result) => f.debug_tuple("Response").field(result).finish(),
            Execution::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Run an operation to completion. Never opens a stream.
    async fn execute(
        &self,
        request: OperationRequest,
        context: RequestContext,
    ) -> Result<ExecutionResult, ExecutorError>;

    /// Run an operation, opening a live stream when it is a subscription.
    async fn invoke(
        &self,
        request: OperationRequest,
        context: RequestContext,
    ) -> Result<Execution, ExecutorError>;
}
