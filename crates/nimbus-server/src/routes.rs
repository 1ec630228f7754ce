//! HTTP routes for the Nimbus server.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
};
use nimbus_core::{DEFAULT_FUNCTION, Error as CoreError, InvocationContext, InvocationResult, Runtime, Value};
use nimbus_script::format_number;
use tower_http::cors::CorsLayer;

use crate::principal::PrincipalResolver;
use crate::ws;

/// Longest accepted function name, in characters.
pub const MAX_FUNCTION_NAME_LENGTH: usize = 256;

const REQUEST_ID_HEADER: &str = "x-request-id";
const RESPONSE_ID_HEADER: &str = "request-id";

/// Application state shared across handlers.
pub struct AppState {
    pub runtime: Runtime,
    /// Optional hook filling `ctx.user`.
    pub principal: Option<Arc<dyn PrincipalResolver>>,
}

impl AppState {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            principal: None,
        }
    }

    pub fn with_principal(mut self, principal: Arc<dyn PrincipalResolver>) -> Self {
        self.principal = Some(principal);
        self
    }

    pub(crate) fn user(&self, headers: &HeaderMap) -> Option<serde_json::Value> {
        self.principal.as_ref().and_then(|p| p.resolve(headers))
    }
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/_/healthz", get(health_handler))
        .route("/_/ws", get(ws::ws_handler))
        .route("/", any(invoke_root_handler))
        .route("/{*path}", any(invoke_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> &'static str {
    "ok"
}

async fn invoke_root_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state, String::new(), method, uri, headers, body).await
}

async fn invoke_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state, path, method, uri, headers, body).await
}

/// Invoke the function named by the request path.
async fn dispatch(
    state: Arc<AppState>,
    name: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let name = name.trim_start_matches('/').to_string();
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let response = if name.chars().count() > MAX_FUNCTION_NAME_LENGTH {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "Function name is too long",
                "maxLength": MAX_FUNCTION_NAME_LENGTH,
            })),
        )
            .into_response()
    } else {
        match parse_body(&headers, &body) {
            Ok(body) => {
                let ctx = InvocationContext::new(name.clone())
                    .with_method(method.as_str())
                    .with_headers(header_map(&headers))
                    .with_query(parse_query(uri.query().unwrap_or_default()))
                    .with_params(serde_json::json!({ "name": name }))
                    .with_body(body)
                    .with_url(uri.to_string())
                    .with_request_id(request_id.clone())
                    .with_user(state.user(&headers));
                invoke(&state.runtime, ctx).await
            }
            Err(message) => (StatusCode::BAD_REQUEST, message).into_response(),
        }
    };

    with_request_id(response, &request_id)
}

async fn invoke(runtime: &Runtime, ctx: InvocationContext) -> Response {
    let target = if runtime.functions().has(&ctx.function_name) {
        ctx.function_name.clone()
    } else if runtime.functions().has(DEFAULT_FUNCTION) {
        DEFAULT_FUNCTION.to_string()
    } else {
        return (StatusCode::NOT_FOUND, "Function Not Found").into_response();
    };

    let use_interceptor = runtime.has_interceptor();
    let request_id = ctx.request_id.clone();
    let runtime = runtime.clone();
    let joined = tokio::task::spawn_blocking({
        let target = target.clone();
        move || runtime.invoke(&target, &ctx, use_interceptor)
    })
    .await;

    match joined {
        Ok(Ok(result)) => render(&target, &request_id, result),
        Ok(Err(CoreError::FunctionNotFound(_))) => {
            (StatusCode::NOT_FOUND, "Function Not Found").into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(function = %target, request_id = %request_id, "failed to invoke: {e}");
            internal_error(&request_id)
        }
        Err(e) => {
            tracing::error!(function = %target, request_id = %request_id, "invocation task failed: {e}");
            internal_error(&request_id)
        }
    }
}

/// Map a result envelope to a response.
fn render(function: &str, request_id: &str, result: InvocationResult) -> Response {
    let data = match result.outcome {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(
                function = %function,
                request_id = %request_id,
                elapsed_ms = result.elapsed_ms,
                "{e}"
            );
            return internal_error(request_id);
        }
    };

    match data {
        Value::Null => StatusCode::OK.into_response(),
        Value::Number(n) => format_number(n).into_response(),
        Value::String(s) => s.to_string().into_response(),
        other => Json(other.to_json()).into_response(),
    }
}

fn internal_error(request_id: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "Internal Server Error",
            "requestId": request_id,
        })),
    )
        .into_response()
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(RESPONSE_ID_HEADER, value);
    }
    response
}

/// Lower-cased header names; repeated headers are joined with `, `.
pub(crate) fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

/// Query string as a JSON object; repeated keys collect into arrays.
pub(crate) fn parse_query(query: &str) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = serde_json::Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(serde_json::Value::Array(items)) => items.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = serde_json::Value::Array(vec![previous, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    serde_json::Value::Object(map)
}

/// Decode the body according to its content type.
fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<serde_json::Value, &'static str> {
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") || content_type.contains("+json") {
        serde_json::from_slice(body).map_err(|_| "Invalid JSON body")
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        Ok(parse_query(&String::from_utf8_lossy(body)))
    } else {
        Ok(match std::str::from_utf8(body) {
            Ok(text) => serde_json::Value::String(text.to_string()),
            Err(_) => serde_json::Value::Null,
        })
    }
}
