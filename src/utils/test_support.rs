//! In-process upstream stubs for tests

use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// JSON-RPC node answering `getTokenLargestAccounts` with `value`
pub fn rpc_stub(value: Value) -> Router {
    Router::new().route(
        "/",
        post(move |Json(req): Json<Value>| {
            let value = value.clone();
            async move {
                let id = req.get("id").cloned().unwrap_or(json!(1));
                let result = match req.get("method").and_then(|m| m.as_str()) {
                    Some("getVersion") => json!({"solana-core": "1.18.0", "feature-set": 0}),
                    _ => json!({"context": {"slot": 1}, "value": value}),
                };
                Json(json!({"jsonrpc": "2.0", "result": result, "id": id}))
            }
        }),
    )
}

/// JSON-RPC node that fails every call with an RPC-level error
pub fn rpc_error_stub() -> Router {
    Router::new().route(
        "/",
        post(|Json(req): Json<Value>| async move {
            let id = req.get("id").cloned().unwrap_or(json!(1));
            Json(json!({
                "jsonrpc": "2.0",
                "error": {"code": -32602, "message": "Invalid param: not a Token mint"},
                "id": id
            }))
        }),
    )
}

/// Endpoint that always answers with an HTTP status and no body
pub fn status_stub(status: StatusCode) -> Router {
    Router::new().fallback(move || async move { status })
}
