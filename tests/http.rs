//! Single-shot HTTP exchanges through the application facade.

mod common;

use axum::http::StatusCode;
use bytes::Bytes;
use common::{demo_app, DenyAll, TestClient};
use gql_transport::{ConnectionScope, Inbound, Outbound};
use serde_json::{json, Value};

struct Reply {
    status: StatusCode,
    headers: Vec<(String, String)>,
    raw: Bytes,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.raw).unwrap()
    }
}

async fn read_reply(client: &mut TestClient) -> Reply {
    let Outbound::HttpResponseStart { status, headers } = client.next().await else {
        panic!("expected a response start");
    };
    let Outbound::HttpResponseBody { body, more_body } = client.next().await else {
        panic!("expected a response body");
    };
    assert!(!more_body);
    Reply {
        status,
        headers,
        raw: body,
    }
}

fn post(body: &str) -> ConnectionScope {
    ConnectionScope::http("POST", "/")
        .with_header("Content-Type", "application/json")
        .with_header("Content-Length", body.len().to_string())
}

async fn exchange(scope: ConnectionScope, body: &str) -> Reply {
    let app = demo_app();
    let mut client = TestClient::spawn(&app, scope);
    client
        .send(Inbound::HttpRequest {
            body: Bytes::copy_from_slice(body.as_bytes()),
            more_body: false,
        })
        .await;
    let reply = read_reply(&mut client).await;
    client.finished().await;
    reply
}

#[tokio::test]
async fn exact_length_body_returns_data() {
    let body = r#"{"query": "{ aNum }"}"#;
    let reply = exchange(post(body), body).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("content-type"), Some("application/json"));
    assert_eq!(reply.header("content-length"), Some(reply.raw.len().to_string().as_str()));
    assert_eq!(reply.json(), json!({"data": {"aNum": 1}}));
    assert!(reply.json().get("errors").is_none());
}

#[tokio::test]
async fn body_split_across_chunks() {
    let body = r#"{"query": "{ aNumWithArgs(num: 3) }"}"#;
    let (head, tail) = body.split_at(10);

    let app = demo_app();
    let mut client = TestClient::spawn(&app, post(body));
    client
        .send(Inbound::HttpRequest {
            body: Bytes::copy_from_slice(head.as_bytes()),
            more_body: true,
        })
        .await;
    client
        .send(Inbound::HttpRequest {
            body: Bytes::copy_from_slice(tail.as_bytes()),
            more_body: false,
        })
        .await;

    let reply = read_reply(&mut client).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({"data": {"aNumWithArgs": 3}}));
}

#[tokio::test]
async fn short_body_with_early_close_fails_without_hanging() {
    let app = demo_app();
    let scope = ConnectionScope::http("POST", "/").with_header("content-length", "100");
    let mut client = TestClient::spawn(&app, scope);

    client
        .send(Inbound::HttpRequest {
            body: Bytes::from_static(br#"{"query": "#),
            more_body: true,
        })
        .await;
    client.send(Inbound::HttpDisconnect).await;

    let reply = read_reply(&mut client).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let message = reply.json()["errors"][0]["message"].as_str().unwrap().to_owned();
    assert!(message.contains("before it was complete"), "{message}");
    client.finished().await;
}

#[tokio::test]
async fn closed_inbound_stream_also_fails_the_body() {
    let app = demo_app();
    let scope = ConnectionScope::http("POST", "/").with_header("content-length", "100");
    let (connection, peer) = gql_transport::Connection::pair(scope, 8);
    let gql_transport::net::PeerEnd {
        inbound,
        mut outbound,
    } = peer;
    inbound
        .send(Inbound::HttpRequest {
            body: Bytes::from_static(b"{"),
            more_body: true,
        })
        .await
        .unwrap();
    drop(inbound);

    tokio::time::timeout(common::TIMEOUT, app.handle(connection))
        .await
        .unwrap();
    match outbound.recv().await {
        Some(Outbound::HttpResponseStart { status, .. }) => {
            assert_eq!(status, StatusCode::BAD_REQUEST)
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[tokio::test]
async fn execution_errors_are_400() {
    let body = r#"{"query": "{ failing }"}"#;
    let reply = exchange(post(body), body).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let payload = reply.json();
    assert!(payload.get("data").is_none());
    assert_eq!(payload["errors"][0]["message"], "intentional failure");
    assert_eq!(payload["errors"][0]["path"], json!(["failing"]));
}

#[tokio::test]
async fn validation_errors_are_forwarded() {
    let body = r#"{"query": "{ noSuchField }"}"#;
    let reply = exchange(post(body), body).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["errors"][0]["message"]
        .as_str()
        .unwrap()
        .contains("noSuchField"));
}

#[tokio::test]
async fn malformed_envelope_is_400() {
    for body in ["not json", "[1, 2]", r#"{"variables": {}}"#, r#"{"query": 5}"#] {
        let reply = exchange(post(body), body).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{body}");
        assert!(reply.json()["errors"][0]["message"]
            .as_str()
            .unwrap()
            .starts_with("malformed envelope"));
    }
}

#[tokio::test]
async fn variables_and_operation_name() {
    let body = json!({
        "query": "query a { aNum } query b($num: Int!) { aNumWithArgs(num: $num) }",
        "variables": {"num": 7},
        "operationName": "b",
    })
    .to_string();
    let reply = exchange(post(&body), &body).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({"data": {"aNumWithArgs": 7}}));
}

#[tokio::test]
async fn subscriptions_are_not_streamed_over_http() {
    let body = r#"{"query": "subscription { count(upTo: 2) }"}"#;
    let reply = exchange(post(body), body).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn context_carries_request_details() {
    let body = r#"{"query": "{ getContext }", "trace": true}"#;
    let scope = post(body)
        .with_header("X-Custom", "yes")
        .with_query_string("debug=1&name=a%20b")
        .with_metadata("client", "127.0.0.1:4000");
    let reply = exchange(scope, body).await;

    assert_eq!(reply.status, StatusCode::OK);
    let context = &reply.json()["data"]["getContext"];
    assert_eq!(context["transport"], "http");
    assert_eq!(context["method"], "POST");
    assert_eq!(context["headers"]["X-Custom"], "yes");
    assert_eq!(context["query_string"], "debug=1&name=a%20b");
    assert_eq!(context["query_params"], json!([["debug", "1"], ["name", "a b"]]));
    assert_eq!(context["metadata"]["client"], "127.0.0.1:4000");
    assert_eq!(context["extensions"]["trace"], true);
    assert_eq!(context["connection_params"], Value::Null);
}

#[tokio::test]
async fn denied_requests_are_403() {
    let body = r#"{"query": "{ aNum }"}"#;
    let app = demo_app().with_hooks(DenyAll);
    let mut client = TestClient::spawn(&app, post(body));
    client
        .send(Inbound::HttpRequest {
            body: Bytes::copy_from_slice(body.as_bytes()),
            more_body: false,
        })
        .await;

    let reply = read_reply(&mut client).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.json(), json!({"errors": [{"message": "access denied"}]}));
}
