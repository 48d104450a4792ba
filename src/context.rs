//! Per-operation execution context.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::net::{ConnectionScope, TransportKind};
use crate::protocol::OperationRequest;

/// What an executor knows about where an operation came from.
///
/// Attached to every operation as request data, so resolvers can read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub transport: TransportKind,
    pub method: String,
    pub path: String,
    /// Header names keep the case they arrived in; a repeated header keeps its last value.
    pub headers: BTreeMap<String, String>,
    pub query_string: String,
    pub query_params: Vec<(String, String)>,
    /// Host-supplied transport metadata.
    pub metadata: Map<String, Value>,
    /// Extra fields carried next to the query in the envelope.
    pub extensions: Map<String, Value>,
    /// `connection_init` payload of a graphql-ws session.
    pub connection_params: Option<Value>,
}

impl RequestContext {
    pub fn from_scope(
        scope: &ConnectionScope,
        request: &OperationRequest,
        connection_params: Option<&Value>,
    ) -> Self {
        let query_params = url::form_urlencoded::parse(scope.query_string.as_bytes())
            .into_owned()
            .collect();

        Self {
            transport: scope.kind,
            method: scope.method.clone(),
            path: scope.path.clone(),
            headers: scope.headers.iter().cloned().collect(),
            query_string: scope.query_string.clone(),
            query_params,
            metadata: scope.metadata.clone(),
            extensions: request.extensions.clone(),
            connection_params: connection_params.cloned(),
        }
    }

    /// Header value by name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}
