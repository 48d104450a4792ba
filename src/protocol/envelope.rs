//! Request envelope codec.
//!
//! The envelope is the JSON object every transport carries an operation in:
//! `{"query": ..., "variables": ..., "operationName": ..., ...extra}`.
//! Only the shape is checked here; whether `operationName` names a real
//! operation is for the executor to decide.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// An inbound message that does not have the envelope shape.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("malformed envelope: expected a JSON object")]
    NotAnObject,

    #[error("malformed envelope: missing required field \"query\"")]
    MissingQuery,

    #[error("malformed envelope: field \"{0}\" has the wrong type")]
    InvalidField(&'static str),
}

/// A decoded operation, independent of the transport it arrived on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRequest {
    pub query: String,

    pub variables: Map<String, Value>,

    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// Any other fields the payload carried (`id`, `extensions`, ...).
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl OperationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Map::new(),
            operation_name: None,
            extensions: Map::new(),
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Decode an envelope from raw bytes.
    pub fn decode(raw: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_slice(raw)?;
        Self::from_value(value)
    }

    /// Decode an envelope that has already been parsed as JSON.
    ///
    /// `variables: null` is treated like an absent field.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut fields) = value else {
            return Err(EnvelopeError::NotAnObject);
        };

        let query = match fields.remove("query") {
            Some(Value::String(query)) => query,
            Some(_) => return Err(EnvelopeError::InvalidField("query")),
            None => return Err(EnvelopeError::MissingQuery),
        };

        let variables = match fields.remove("variables") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(variables)) => variables,
            Some(_) => return Err(EnvelopeError::InvalidField("variables")),
        };

        let operation_name = match fields.remove("operationName") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name),
            Some(_) => return Err(EnvelopeError::InvalidField("operationName")),
        };

        Ok(Self {
            query,
            variables,
            operation_name,
            extensions: fields,
        })
    }

    /// Encode back to the wire shape.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Take a payload-carried extra field out of the envelope.
    pub fn take_extension(&mut self, key: &str) -> Option<Value> {
        self.extensions.remove(key)
    }
}
