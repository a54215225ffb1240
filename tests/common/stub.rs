use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};

/// Local HTTP server standing in for the API under test
pub struct StubServer {
    pub addr: SocketAddr,
}

impl StubServer {
    pub async fn start() -> Self {
        let router = Router::new()
            .route("/status/{code}", any(status))
            .route("/delay/{ms}", any(delay))
            .route("/echo", any(echo))
            .route("/text", get(text))
            .route("/users/{id}", get(user))
            .route("/redirect", get(|| async { Redirect::temporary("/users/1") }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(json!({ "status": code })))
}

async fn delay(Path(ms): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!({ "delayed_ms": ms }))
}

async fn echo(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Json<Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    Json(json!({
        "method": method.as_str(),
        "headers": headers,
        "query": query,
        "body": body,
    }))
}

async fn text() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/plain")], "hello world")
}

async fn user(Path(id): Path<u64>) -> Json<Value> {
    Json(json!({
        "id": id,
        "name": format!("user {}", id),
        "tags": ["admin", "qa"],
        "profile": { "active": true, "score": 9.5 }
    }))
}
