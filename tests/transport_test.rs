mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;

use apirun::models::PreparedRequest;
use apirun::services::{HttpTransport, TransportError};
use common::StubServer;

fn request(method: &str, url: String) -> PreparedRequest {
    PreparedRequest {
        method: method.to_string(),
        url,
        headers: BTreeMap::new(),
        query_params: BTreeMap::new(),
        body: None,
    }
}

fn transport(timeout: Duration) -> HttpTransport {
    HttpTransport::new(timeout, true).unwrap()
}

#[tokio::test]
async fn test_json_response_is_decoded() {
    let stub = StubServer::start().await;

    let response = transport(Duration::from_secs(5))
        .send(&request("GET", stub.url("/users/7")))
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body["name"], "user 7");
    assert_eq!(response.method, "GET");
    assert!(response.elapsed_ms >= 0.0);
    assert_eq!(
        response.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
}

#[tokio::test]
async fn test_error_status_is_not_a_transport_failure() {
    let stub = StubServer::start().await;

    let response = transport(Duration::from_secs(5))
        .send(&request("DELETE", stub.url("/status/503")))
        .await
        .unwrap();

    assert_eq!(response.status_code, 503);
    assert_eq!(response.body, json!({ "status": 503 }));
}

#[tokio::test]
async fn test_non_json_body_is_wrapped() {
    let stub = StubServer::start().await;

    let response = transport(Duration::from_secs(5))
        .send(&request("GET", stub.url("/text")))
        .await
        .unwrap();

    assert_eq!(
        response.body,
        json!({ "text": "hello world", "content_type": "text/plain" })
    );
}

#[tokio::test]
async fn test_headers_query_and_body_are_sent() {
    let stub = StubServer::start().await;
    let mut req = request("POST", stub.url("/echo"));
    req.headers.insert("X-Api-Key".to_string(), "secret".to_string());
    req.query_params.insert("page".to_string(), "2".to_string());
    req.query_params.insert("q".to_string(), "a b".to_string());
    req.body = Some(json!({ "name": "alice", "tags": [1, 2] }));

    let response = transport(Duration::from_secs(5)).send(&req).await.unwrap();

    let echoed = &response.body;
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["headers"]["x-api-key"], "secret");
    assert_eq!(echoed["headers"]["content-type"], "application/json");
    assert_eq!(echoed["query"], json!({ "page": "2", "q": "a b" }));
    assert_eq!(echoed["body"], json!({ "name": "alice", "tags": [1, 2] }));
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let stub = StubServer::start().await;

    let response = transport(Duration::from_secs(5))
        .send(&request("GET", stub.url("/redirect")))
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert!(response.url.ends_with("/users/1"));
    assert_eq!(response.body["id"], 1);
}

#[tokio::test]
async fn test_timeout_is_typed() {
    let stub = StubServer::start().await;

    let err = transport(Duration::from_millis(200))
        .send(&request("GET", stub.url("/delay/2000")))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Timeout { timeout_ms: 200 }));
    assert_eq!(err.kind(), "timeout");
}

#[tokio::test]
async fn test_malformed_url_is_invalid_request() {
    let err = transport(Duration::from_secs(1))
        .send(&request("GET", "not a url".to_string()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "invalid_request");
}
