//! Integration tests for the `/api/graphql` endpoints against a mocked
//! upstream.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;

use {
    mockito::Matcher,
    serde_json::{Value, json},
    tokio::net::TcpListener,
};

use {
    fieldgate_gateway::{GatewayState, build_gateway_app},
    fieldgate_graphql::{GatewayClient, Upstream},
};

/// Start a gateway proxying to `endpoint`.
async fn start_gateway(endpoint: &str) -> SocketAddr {
    let state = GatewayState::new(Upstream::parse(endpoint).unwrap()).unwrap();
    let app = build_gateway_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Address nothing is listening on.
fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn post_graphql(addr: SocketAddr, body: String) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/graphql"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let addr = start_gateway("http://localhost:4000/graphql").await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body.get("upstream").is_none());
}

#[tokio::test]
async fn query_is_proxied_and_passed_through() {
    let mut upstream = mockito::Server::new_async().await;
    let upstream_body = json!({
        "data": { "devices": [{ "id": "plc-1", "online": true }] }
    });
    let mock = upstream
        .mock("POST", "/graphql")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "query": "query($p: ID!) { devices(project: $p) { id online } }",
            "variables": { "p": "line-4" }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(upstream_body.to_string())
        .create_async()
        .await;

    let addr = start_gateway(&format!("{}/graphql", upstream.url())).await;
    let resp = post_graphql(
        addr,
        json!({
            "query": "query($p: ID!) { devices(project: $p) { id online } }",
            "variables": { "p": "line-4" }
        })
        .to_string(),
    )
    .await;

    mock.assert_async().await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, upstream_body);
}

#[tokio::test]
async fn nonconforming_upstream_body_is_relayed_verbatim() {
    let upstream_body = r#"{"data":{"a":1},"errors":[{"msg":"x"}],"errors_seen":null}"#;
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("POST", "/graphql")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(upstream_body)
        .create_async()
        .await;

    let addr = start_gateway(&format!("{}/graphql", upstream.url())).await;
    let resp = post_graphql(addr, json!({ "query": "{ a }" }).to_string()).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert_eq!(resp.text().await.unwrap(), upstream_body);
}

#[tokio::test]
async fn missing_query_is_rejected_before_upstream() {
    let mut upstream = mockito::Server::new_async().await;
    let mock = upstream
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let addr = start_gateway(&format!("{}/graphql", upstream.url())).await;
    for body in [json!({ "variables": { "a": 1 } }), json!({ "query": "" })] {
        let resp = post_graphql(addr, body.to_string()).await;
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "errors": [{ "message": "Query is required" }] }));
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn upstream_error_status_is_still_200() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("POST", "/graphql")
        .with_status(500)
        .with_body("internal")
        .create_async()
        .await;

    let addr = start_gateway(&format!("{}/graphql", upstream.url())).await;
    let resp = post_graphql(addr, json!({ "query": "{ nats { status } }" }).to_string()).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "errors": [{ "message": "GraphQL request failed: 500 Internal Server Error" }] })
    );
}

#[tokio::test]
async fn unreachable_upstream_reports_configured_host() {
    let dead = closed_addr();
    let addr = start_gateway(&format!("http://{dead}/graphql")).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/graphql"))
        .header("x-forwarded-host", "attacker.example")
        .json(&json!({ "query": "{ services { name } }" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["errors"][0]["message"],
        format!("Cannot connect to GraphQL server at {dead}")
    );
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn malformed_body_is_a_server_error_envelope() {
    let addr = start_gateway("http://localhost:4000/graphql").await;
    let resp = post_graphql(addr, "{ not json".to_string()).await;

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["errors"][0]["message"].is_string());
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn gateway_client_round_trip() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("POST", "/graphql")
        .with_status(200)
        .with_body(r#"{"data":{"mqtt":{"bridges":2}}}"#)
        .create_async()
        .await;

    let addr = start_gateway(&format!("{}/graphql", upstream.url())).await;
    let client = GatewayClient::new(format!("http://{addr}").parse().unwrap());
    let envelope = client.query("{ mqtt { bridges } }", None).await.unwrap();

    assert_eq!(envelope.data, Some(json!({ "mqtt": { "bridges": 2 } })));
}
