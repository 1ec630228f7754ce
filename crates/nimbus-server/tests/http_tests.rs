//! HTTP dispatch tests against the router, without a listening socket.

use std::fs;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode},
};
use nimbus_core::{Runtime, RuntimeConfig};
use nimbus_server::{AppState, create_router};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

// =============================================================================
// Test Helpers
// =============================================================================

struct TestServer {
    _dir: TempDir,
    router: Router,
}

impl TestServer {
    fn new(files: &[(&str, &str)]) -> Self {
        Self::with_state(files, AppState::new)
    }

    fn with_state(files: &[(&str, &str)], state: impl FnOnce(Runtime) -> AppState) -> Self {
        let dir = TempDir::new().unwrap();
        for (name, source) in files {
            let path = dir.path().join(format!("{name}.ns"));
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, source).unwrap();
        }
        let runtime = Runtime::new(RuntimeConfig::new(dir.path()));
        runtime.initialize().unwrap();
        let router = create_router(Arc::new(state(runtime)), 1024);
        Self { _dir: dir, router }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, String) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }
}

// =============================================================================
// Routes
// =============================================================================

#[tokio::test]
async fn test_health() {
    let server = TestServer::new(&[]);
    let (status, _, body) = server.get("/_/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_invoke_hello() {
    let server = TestServer::new(&[(
        "hello",
        "export default (ctx) => ({ data: 'hi ' + ctx.query.name })",
    )]);
    let (status, headers, body) = server.get("/hello?name=Ann").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("request-id"));
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"data": "hi Ann"}));
}

#[tokio::test]
async fn test_nested_name_and_request_id_echo() {
    let server = TestServer::new(&[(
        "api/users",
        "export default fn(ctx) { return ctx.__function_name + ' ' + ctx.requestId }",
    )]);
    let request = Request::get("/api/users")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = server.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["request-id"], "req-42");
    assert_eq!(body, "api/users req-42");
}

#[tokio::test]
async fn test_result_rendering() {
    let server = TestServer::new(&[
        ("number", "export default fn() { return 42 }"),
        ("nothing", "export default fn() { return null }"),
        ("flag", "export default fn() { return true }"),
    ]);
    assert_eq!(server.get("/number").await.2, "42");
    let (status, _, body) = server.get("/nothing").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(server.get("/flag").await.2, "true");
}

#[tokio::test]
async fn test_json_body() {
    let server = TestServer::new(&[(
        "echo",
        "export default fn(ctx) { return { method: ctx.method, got: ctx.body.items.length } }",
    )]);
    let request = Request::post("/echo")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"items":[1,2,3]}"#))
        .unwrap();
    let (status, _, body) = server.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({"method": "POST", "got": 3})
    );
}

#[tokio::test]
async fn test_body_limit() {
    let server = TestServer::new(&[("echo", "export default fn(ctx) { return 1 }")]);
    let request = Request::post("/echo")
        .header("content-type", "text/plain")
        .body(Body::from("x".repeat(4096)))
        .unwrap();
    let (status, _, _) = server.send(request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

// =============================================================================
// Errors and Fallbacks
// =============================================================================

#[tokio::test]
async fn test_name_too_long() {
    let server = TestServer::new(&[]);
    let (status, _, body) = server.get(&format!("/{}", "a".repeat(257))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({"error": "Function name is too long", "maxLength": 256})
    );
}

#[tokio::test]
async fn test_not_found_without_default() {
    let server = TestServer::new(&[]);
    let (status, _, body) = server.get("/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Function Not Found");
}

#[tokio::test]
async fn test_default_fallback_keeps_requested_name() {
    let server = TestServer::new(&[(
        "__default__",
        "export default fn(ctx) { return 'fallback for ' + ctx.__function_name }",
    )]);
    let (status, _, body) = server.get("/missing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "fallback for missing");
}

#[tokio::test]
async fn test_error_envelope_hides_details() {
    let server = TestServer::new(&[(
        "boom",
        "export default fn() { throw { secret: 'stack detail' } }",
    )]);
    let (status, headers, body) = server.get("/boom").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "Internal Server Error");
    assert_eq!(body["requestId"], headers["request-id"].to_str().unwrap());
    assert!(body.get("secret").is_none());
}

#[tokio::test]
async fn test_interceptor_applies_when_present() {
    let server = TestServer::new(&[
        (
            "__interceptor__",
            "export default fn(ctx, next) { if (ctx.headers['x-token'] != 'ok') { return 'denied' }\nreturn next(ctx) }",
        ),
        ("private", "export default fn() { return 'secret' }"),
    ]);
    assert_eq!(server.get("/private").await.2, "denied");

    let request = Request::get("/private")
        .header("x-token", "ok")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.send(request).await.2, "secret");
}

#[tokio::test]
async fn test_principal_resolver_populates_user() {
    let server = TestServer::with_state(
        &[("whoami", "export default fn(ctx) { return ctx.user ?? 'anonymous' }")],
        |runtime| {
            AppState::new(runtime).with_principal(Arc::new(|headers: &HeaderMap| {
                headers
                    .get("x-user")
                    .and_then(|v| v.to_str().ok())
                    .map(|u| json!({ "id": u }))
            }))
        },
    );

    assert_eq!(server.get("/whoami").await.2, "anonymous");
    let request = Request::get("/whoami")
        .header("x-user", "ann")
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = server.send(request).await;
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"id": "ann"}));
}
