//! Execution results and their response shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::protocol::ErrorMessage;

/// One entry of a GraphQL `errors` list.
///
/// `details` holds whatever else the executor reported (`locations`,
/// `path`, `extensions`) and is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Map::new(),
        }
    }
}

/// Outcome of executing an operation once, or one item of a live stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionResult {
    pub data: Option<Value>,
    pub errors: Vec<GraphqlError>,
}

impl ExecutionResult {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<GraphqlError>) -> Self {
        Self { data: None, errors }
    }

    /// Result carrying a single error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::from_errors(vec![GraphqlError::new(message)])
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Response body: `{"data": ...}` when there are no errors, otherwise
    /// `{"errors": [...]}` with the data key left out.
    pub fn to_payload(&self) -> Value {
        if self.errors.is_empty() {
            json!({ "data": self.data.clone().unwrap_or(Value::Null) })
        } else {
            json!({ "errors": self.errors })
        }
    }

    /// Error list reduced to bare messages, as graphql-ws `error` frames carry it.
    pub fn error_messages(&self) -> Vec<ErrorMessage> {
        self.errors
            .iter()
            .map(|e| ErrorMessage::new(e.message.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_payload_has_no_errors_key() {
        let result = ExecutionResult::from_data(json!({"aNum": 1}));
        assert!(result.is_ok());
        assert_eq!(result.to_payload(), json!({"data": {"aNum": 1}}));
    }

    #[test]
    fn errors_suppress_data() {
        let mut error = GraphqlError::new("boom");
        error.details.insert("path".into(), json!(["failing"]));
        let result = ExecutionResult {
            data: Some(json!({"failing": null})),
            errors: vec![error],
        };

        assert!(!result.is_ok());
        assert_eq!(
            result.to_payload(),
            json!({"errors": [{"message": "boom", "path": ["failing"]}]})
        );
        assert_eq!(result.error_messages(), vec![ErrorMessage::new("boom")]);
    }

    #[test]
    fn absent_data_serializes_as_null() {
        assert_eq!(ExecutionResult::default().to_payload(), json!({"data": null}));
    }
}
