//! Small schema served by the `gql-transport` binary and used in tests.

use std::time::Duration;

use async_graphql::{Context, EmptyMutation, Json, Object, Schema};
use futures_util::stream::{self, Stream};

use crate::context::RequestContext;

pub type DemoSchema = Schema<Query, EmptyMutation, Subscription>;

pub fn schema() -> DemoSchema {
    Schema::build(Query, EmptyMutation, Subscription).finish()
}

pub struct Query;

#[Object]
impl Query {
    async fn a_num(&self) -> i32 {
        1
    }

    async fn a_num_with_args(&self, num: i32) -> i32 {
        num
    }

    /// The context the transport built for this operation.
    async fn get_context(&self, ctx: &Context<'_>) -> Option<Json<RequestContext>> {
        ctx.data_opt::<RequestContext>().cloned().map(Json)
    }

    async fn failing(&self) -> async_graphql::Result<i32> {
        Err("intentional failure".into())
    }
}

pub struct Subscription;

#[async_graphql::Subscription]
impl Subscription {
    /// Yields `0..up_to`, one value every `interval_ms`.
    async fn count(
        &self,
        up_to: i32,
        #[graphql(default = 10)] interval_ms: i32,
    ) -> impl Stream<Item = i32> {
        let interval = Duration::from_millis(interval_ms.max(0) as u64);
        stream::unfold(0, move |n| async move {
            if n >= up_to {
                return None;
            }
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            Some((n, n + 1))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn query_fields_resolve() {
        let response = schema().execute("{ aNum aNumWithArgs(num: 5) }").await;
        assert!(response.errors.is_empty());
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({"aNum": 1, "aNumWithArgs": 5})
        );
    }

    #[tokio::test]
    async fn context_is_null_without_request_data() {
        let response = schema().execute("{ getContext }").await;
        assert_eq!(response.data.into_json().unwrap(), json!({"getContext": null}));
    }

    #[tokio::test]
    async fn count_stops_at_the_bound() {
        let items: Vec<_> = schema()
            .execute_stream("subscription { count(upTo: 2, intervalMs: 0) }")
            .map(|response| response.data.into_json().unwrap())
            .collect()
            .await;
        assert_eq!(items, vec![json!({"count": 0}), json!({"count": 1})]);
    }
}
