//! Application hooks called by the transport handlers.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::net::ConnectionScope;
use crate::protocol::OperationRequest;

/// Connection-establishment and context-construction hooks.
///
/// `check_access` runs exactly once per connection (once per request for
/// plain HTTP) before any operation is processed. There is no way around
/// it: the default implementation permits everything.
#[async_trait]
pub trait AppHooks: Send + Sync + 'static {
    /// Decide whether the connection may proceed.
    ///
    /// `init_payload` is the `connection_init` payload on graphql-ws
    /// sessions and `None` everywhere else.
    async fn check_access(&self, scope: &ConnectionScope, init_payload: Option<&Value>) -> bool {
        let _ = (scope, init_payload);
        true
    }

    /// Build the context handed to the executor for one operation.
    async fn build_context(
        &self,
        scope: &ConnectionScope,
        request: &OperationRequest,
        connection_params: Option<&Value>,
    ) -> RequestContext {
        RequestContext::from_scope(scope, request, connection_params)
    }
}

/// Hooks with every default: all connections are permitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

impl AppHooks for PermitAll {}
