//! Invocation context handed to a function's entry point.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use nimbus_script::{ScriptError, Value};
use thiserror::Error;

/// Error returned by a [`Transport`] that can no longer send.
#[derive(Debug, Clone, Error)]
#[error("transport {0} is closed")]
pub struct TransportClosed(pub String);

/// An opaque handle back to the caller's connection, e.g. a WebSocket.
pub trait Transport: Send + Sync {
    /// Stable connection id.
    fn id(&self) -> &str;

    /// Queue a text frame for the peer.
    fn send_text(&self, text: String) -> Result<(), TransportClosed>;

    /// Close the connection.
    fn close(&self);
}

/// Per-call input. Created fresh for every invocation, never shared.
#[derive(Clone, Default)]
pub struct InvocationContext {
    pub function_name: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub query: serde_json::Value,
    pub params: serde_json::Value,
    pub body: serde_json::Value,
    pub files: serde_json::Value,
    pub url: String,
    /// Correlation id, echoed in logs and error responses.
    pub request_id: String,
    /// Authenticated principal, populated by an external auth hook.
    pub user: Option<serde_json::Value>,
    pub transport: Option<Arc<dyn Transport>>,
}

impl InvocationContext {
    /// Context for `function_name` with a fresh request id.
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_query(mut self, query: serde_json::Value) -> Self {
        self.query = query;
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_files(mut self, files: serde_json::Value) -> Self {
        self.files = files;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_user(mut self, user: Option<serde_json::Value>) -> Self {
        self.user = user;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The context as seen by script code.
    pub fn to_value(&self) -> Value {
        let headers = Value::object(
            self.headers
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str()))),
        );

        Value::object([
            ("__function_name", Value::from(self.function_name.as_str())),
            ("method", Value::from(self.method.as_str())),
            ("headers", headers),
            ("query", object_or_empty(&self.query)),
            ("params", Value::from_json(&self.params)),
            ("body", Value::from_json(&self.body)),
            ("files", Value::from_json(&self.files)),
            ("url", Value::from(self.url.as_str())),
            ("requestId", Value::from(self.request_id.as_str())),
            ("user", self.user.as_ref().map(Value::from_json).unwrap_or_default()),
            (
                "socket",
                self.transport
                    .as_ref()
                    .map(|t| socket_value(Arc::clone(t)))
                    .unwrap_or_default(),
            ),
        ])
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("function_name", &self.function_name)
            .field("method", &self.method)
            .field("request_id", &self.request_id)
            .field("url", &self.url)
            .field("transport", &self.transport.as_ref().map(|t| t.id().to_string()))
            .finish_non_exhaustive()
    }
}

fn object_or_empty(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::object(std::iter::empty::<(String, Value)>()),
        other => Value::from_json(other),
    }
}

/// `ctx.socket`: `{ id, send(msg), close() }`.
fn socket_value(transport: Arc<dyn Transport>) -> Value {
    let send = {
        let transport = Arc::clone(&transport);
        Value::native("send", 1, move |_, args| {
            let text = match args.into_iter().next().unwrap_or_default() {
                Value::String(s) => s.to_string(),
                other => other.to_json().to_string(),
            };
            transport
                .send_text(text)
                .map_err(|e| ScriptError::host_with_source(e.to_string(), e))?;
            Ok(Value::Null)
        })
    };
    let close = {
        let transport = Arc::clone(&transport);
        Value::native("close", 0, move |_, _| {
            transport.close();
            Ok(Value::Null)
        })
    };
    Value::object([
        ("id", Value::from(transport.id())),
        ("send", send),
        ("close", close),
    ])
}
