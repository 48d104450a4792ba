//! One-shot WebSocket exchanges (no subprotocol).

mod common;

use common::{demo_app, DenyAll, TestClient};
use gql_transport::{ConnectionScope, Inbound, Outbound};
use serde_json::json;

async fn connect(app: &gql_transport::App) -> TestClient {
    let mut client = TestClient::spawn(app, ConnectionScope::websocket("/"));
    client.send(Inbound::WebsocketConnect).await;
    assert_eq!(
        client.next().await,
        Outbound::WebsocketAccept { subprotocol: None }
    );
    client
}

#[tokio::test]
async fn each_frame_gets_one_reply() {
    let app = demo_app();
    let mut client = connect(&app).await;

    client
        .send_json(json!({"query": "{ aNum }", "id": "first"}))
        .await;
    client
        .send_json(json!({
            "query": "query q($num: Int!) { aNumWithArgs(num: $num) }",
            "variables": {"num": 9},
            "operationName": "q",
        }))
        .await;

    assert_eq!(
        client.next_json().await,
        json!({"data": {"aNum": 1}, "id": "first"})
    );
    assert_eq!(client.next_json().await, json!({"data": {"aNumWithArgs": 9}}));

    client.send(Inbound::WebsocketDisconnect).await;
    assert!(client.finished().await.is_empty());
}

#[tokio::test]
async fn errors_keep_the_id() {
    let app = demo_app();
    let mut client = connect(&app).await;

    client.send_json(json!({"query": "{ failing }", "id": 3})).await;
    let reply = client.next_json().await;
    assert_eq!(reply["id"], 3);
    assert_eq!(reply["errors"][0]["message"], "intentional failure");
    assert!(reply.get("data").is_none());

    client.send_json(json!({"id": "no-query"})).await;
    let reply = client.next_json().await;
    assert_eq!(reply["id"], "no-query");
    assert!(reply["errors"][0]["message"]
        .as_str()
        .unwrap()
        .starts_with("malformed envelope"));
}

#[tokio::test]
async fn subscriptions_are_not_streamed() {
    let app = demo_app();
    let mut client = connect(&app).await;

    client
        .send_json(json!({"query": "subscription { count(upTo: 3) }"}))
        .await;
    let reply = client.next_json().await;
    assert!(reply["errors"].is_array());
}

#[tokio::test]
async fn denied_connections_are_closed() {
    let app = demo_app().with_hooks(DenyAll);
    let mut client = TestClient::spawn(&app, ConnectionScope::websocket("/"));

    client.send(Inbound::WebsocketConnect).await;
    assert_eq!(client.next().await, Outbound::WebsocketClose);
    assert!(client.finished().await.is_empty());
}
