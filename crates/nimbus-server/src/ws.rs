//! WebSocket dispatch to the `__websocket__` function.
//!
//! Each connection produces four kinds of events, delivered one at a time,
//! in order, without the interceptor:
//!
//! | method                 | params                 |
//! |------------------------|------------------------|
//! | `WebSocket:connection` | `null`                 |
//! | `WebSocket:message`    | `{ data, isBinary }`   |
//! | `WebSocket:error`      | `{ message }`          |
//! | `WebSocket:close`      | `{ code, reason }`     |

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, Uri},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use nimbus_core::{InvocationContext, Runtime, Transport, TransportClosed, WEBSOCKET_FUNCTION};
use serde_json::json;
use tokio::sync::mpsc;

use crate::routes::{AppState, header_map};

/// Close code reported when the peer vanished without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported for a close frame without a status.
const NO_STATUS: u16 = 1005;

enum Outbound {
    Text(String),
    Close,
}

/// [`Transport`] writing to one socket through its writer task.
struct SocketTransport {
    id: String,
    tx: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
}

impl SocketTransport {
    fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tx,
            closed: AtomicBool::new(false),
        }
    }
}

impl Transport for SocketTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_text(&self, text: String) -> Result<(), TransportClosed> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportClosed(self.id.clone()));
        }
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| TransportClosed(self.id.clone()))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Outbound::Close);
        }
    }
}

/// WebSocket upgrade handler.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state, uri, headers))
}

/// Handle WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, uri: Uri, headers: HeaderMap) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = Arc::new(SocketTransport::new(tx));
    let user = state.user(&headers);
    let events = EventContext {
        url: uri.to_string(),
        headers,
        user,
    };

    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    tracing::debug!(connection = %transport.id, "websocket connected");
    let conn: Arc<dyn Transport> = transport.clone();
    dispatch_event(&state.runtime, &events, &conn, "WebSocket:connection", serde_json::Value::Null).await;

    let mut closed = false;
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let params = json!({ "data": text.as_str(), "isBinary": false });
                dispatch_event(&state.runtime, &events, &conn, "WebSocket:message", params).await;
            }
            Ok(Message::Binary(data)) => {
                let params = json!({ "data": String::from_utf8_lossy(&data), "isBinary": true });
                dispatch_event(&state.runtime, &events, &conn, "WebSocket:message", params).await;
            }
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|f| (f.code, f.reason.as_str().to_string()))
                    .unwrap_or((NO_STATUS, String::new()));
                let params = json!({ "code": code, "reason": reason });
                dispatch_event(&state.runtime, &events, &conn, "WebSocket:close", params).await;
                closed = true;
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                let params = json!({ "message": e.to_string() });
                dispatch_event(&state.runtime, &events, &conn, "WebSocket:error", params).await;
                break;
            }
        }
    }

    if !closed {
        let params = json!({ "code": ABNORMAL_CLOSURE, "reason": "" });
        dispatch_event(&state.runtime, &events, &conn, "WebSocket:close", params).await;
    }

    transport.close();
    drop(conn);
    drop(transport);
    let _ = writer.await;
    tracing::debug!("websocket disconnected");
}

/// Connection-level fields copied into every event's context.
pub(crate) struct EventContext {
    pub url: String,
    pub headers: HeaderMap,
    pub user: Option<serde_json::Value>,
}

/// Invoke `__websocket__` for one event and wait for it to finish.
pub(crate) async fn dispatch_event(
    runtime: &Runtime,
    events: &EventContext,
    transport: &Arc<dyn Transport>,
    event: &str,
    params: serde_json::Value,
) {
    if !runtime.functions().has(WEBSOCKET_FUNCTION) {
        tracing::error!("FunctionExecutionError: Module '{WEBSOCKET_FUNCTION}' not found");
        return;
    }

    let ctx = InvocationContext::new(WEBSOCKET_FUNCTION)
        .with_method(event)
        .with_params(params)
        .with_url(events.url.clone())
        .with_headers(header_map(&events.headers))
        .with_user(events.user.clone())
        .with_transport(Arc::clone(transport));

    let runtime = runtime.clone();
    let request_id = ctx.request_id.clone();
    let joined =
        tokio::task::spawn_blocking(move || runtime.invoke(WEBSOCKET_FUNCTION, &ctx, false)).await;

    match joined {
        Ok(Ok(result)) => {
            if let Err(e) = &result.outcome {
                tracing::error!(event, request_id = %request_id, "websocket handler failed: {e}");
            }
        }
        Ok(Err(e)) => tracing::error!(event, request_id = %request_id, "{e}"),
        Err(e) => tracing::error!(event, request_id = %request_id, "websocket task failed: {e}"),
    }
}
