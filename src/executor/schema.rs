//! [`Executor`] over an `async_graphql::Schema`.

use async_graphql::parser::parse_query;
use async_graphql::parser::types::{DocumentOperations, OperationType};
use async_graphql::{ObjectType, Schema, ServerError, SubscriptionType, Variables};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;

use crate::context::RequestContext;
use crate::executor::{Execution, ExecutionResult, Executor, ExecutorError, GraphqlError};
use crate::protocol::OperationRequest;

/// Kind of the operation a document selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// Find the kind of operation `operation_name` selects in `query`.
///
/// `None` means the selection cannot be decided here (unparsable source,
/// several operations without a matching name). Such requests are run as
/// one-shot and the schema reports its own error.
pub fn classify(query: &str, operation_name: Option<&str>) -> Option<OperationKind> {
    let document = parse_query(query).ok()?;

    let operation = match &document.operations {
        DocumentOperations::Single(operation) => operation,
        DocumentOperations::Multiple(operations) => {
            let name = operation_name?;
            operations
                .iter()
                .find(|(candidate, _)| candidate.as_str() == name)
                .map(|(_, operation)| operation)?
        }
    };

    Some(match operation.node.ty {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => OperationKind::Subscription,
    })
}

/// Executes operations against an async-graphql schema.
pub struct SchemaExecutor<Q, M, S> {
    schema: Schema<Q, M, S>,
}

impl<Q, M, S> SchemaExecutor<Q, M, S>
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    pub fn new(schema: Schema<Q, M, S>) -> Self {
        Self { schema }
    }

    fn build_request(request: OperationRequest, context: RequestContext) -> async_graphql::Request {
        let variables = Variables::from_json(Value::Object(request.variables));
        let mut built = async_graphql::Request::new(request.query)
            .variables(variables)
            .data(context);
        if let Some(name) = request.operation_name {
            built = built.operation_name(name);
        }
        built
    }
}

#[async_trait]
impl<Q, M, S> Executor for SchemaExecutor<Q, M, S>
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    async fn execute(
        &self,
        request: OperationRequest,
        context: RequestContext,
    ) -> Result<ExecutionResult, ExecutorError> {
        let response = self.schema.execute(Self::build_request(request, context)).await;
        Ok(response.into())
    }

    async fn invoke(
        &self,
        request: OperationRequest,
        context: RequestContext,
    ) -> Result<Execution, ExecutorError> {
        let kind = classify(&request.query, request.operation_name.as_deref());
        let built = Self::build_request(request, context);

        if kind == Some(OperationKind::Subscription) {
            let stream = self.schema.execute_stream(built).map(ExecutionResult::from);
            return Ok(Execution::Stream(stream.boxed()));
        }

        let response = self.schema.execute(built).await;
        Ok(Execution::Response(response.into()))
    }
}

impl From<async_graphql::Response> for ExecutionResult {
    fn from(response: async_graphql::Response) -> Self {
        let data = match serde_json::to_value(&response.data) {
            Ok(Value::Null) | Err(_) => None,
            Ok(data) => Some(data),
        };
        let errors = response.errors.iter().map(GraphqlError::from).collect();
        ExecutionResult { data, errors }
    }
}

impl From<&ServerError> for GraphqlError {
    fn from(err: &ServerError) -> Self {
        match serde_json::to_value(err) {
            Ok(Value::Object(mut details)) => {
                details.remove("message");
                GraphqlError {
                    message: err.message.clone(),
                    details,
                }
            }
            _ => GraphqlError::new(err.message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::net::ConnectionScope;
    use serde_json::json;

    fn context() -> RequestContext {
        RequestContext::from_scope(
            &ConnectionScope::http("POST", "/"),
            &OperationRequest::new(""),
            None,
        )
    }

    #[test]
    fn classify_single_operations() {
        assert_eq!(classify("{ aNum }", None), Some(OperationKind::Query));
        assert_eq!(classify("mutation { x }", None), Some(OperationKind::Mutation));
        assert_eq!(
            classify("subscription { count(upTo: 3) }", Some("ignored")),
            Some(OperationKind::Subscription)
        );
    }

    #[test]
    fn classify_named_operations() {
        let document = "query A { aNum } subscription B { count(upTo: 1) }";
        assert_eq!(classify(document, Some("A")), Some(OperationKind::Query));
        assert_eq!(classify(document, Some("B")), Some(OperationKind::Subscription));
        assert_eq!(classify(document, Some("C")), None);
        assert_eq!(classify(document, None), None);
    }

    #[test]
    fn classify_leaves_broken_documents_to_the_schema() {
        assert_eq!(classify("{ aNum", None), None);
    }

    #[tokio::test]
    async fn queries_come_back_as_one_result() {
        let executor = SchemaExecutor::new(demo::schema());
        let request = OperationRequest::new("query test($num: Int!) { aNum aNumWithArgs(num: $num) }")
            .with_variables(json!({"num": 99}).as_object().cloned().unwrap())
            .with_operation_name("test");

        match executor.invoke(request, context()).await.unwrap() {
            Execution::Response(result) => {
                assert!(result.is_ok());
                assert_eq!(result.data, Some(json!({"aNum": 1, "aNumWithArgs": 99})));
            }
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscriptions_come_back_as_a_stream() {
        let executor = SchemaExecutor::new(demo::schema());
        let request = OperationRequest::new("subscription { count(upTo: 3, intervalMs: 0) }");

        let Execution::Stream(stream) = executor.invoke(request, context()).await.unwrap() else {
            panic!("expected a stream");
        };
        let items: Vec<_> = stream.collect().await;
        let counts: Vec<_> = items.iter().map(|r| r.data.clone().unwrap()["count"].clone()).collect();
        assert_eq!(counts, vec![json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn unknown_operation_name_is_reported_by_the_schema() {
        let executor = SchemaExecutor::new(demo::schema());
        let request = OperationRequest::new("query A { aNum } query B { aNum }").with_operation_name("C");

        match executor.invoke(request, context()).await.unwrap() {
            Execution::Response(result) => assert!(!result.is_ok()),
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_never_streams() {
        let executor = SchemaExecutor::new(demo::schema());
        let result = executor
            .execute(OperationRequest::new("subscription { count(upTo: 3) }"), context())
            .await
            .unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.data, None);
    }

    #[tokio::test]
    async fn resolver_errors_keep_their_details() {
        let executor = SchemaExecutor::new(demo::schema());
        let result = executor
            .execute(OperationRequest::new("{ failing }"), context())
            .await
            .unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "intentional failure");
        assert_eq!(result.errors[0].details.get("path"), Some(&json!(["failing"])));
    }
}
