//! Hook for populating `ctx.user` from request headers.

use axum::http::HeaderMap;

/// Resolves the authenticated principal of a request.
///
/// Authentication policy lives in the implementation; the server only
/// copies whatever is returned into the invocation context.
pub trait PrincipalResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<serde_json::Value>;
}

impl<F> PrincipalResolver for F
where
    F: Fn(&HeaderMap) -> Option<serde_json::Value> + Send + Sync,
{
    fn resolve(&self, headers: &HeaderMap) -> Option<serde_json::Value> {
        self(headers)
    }
}
