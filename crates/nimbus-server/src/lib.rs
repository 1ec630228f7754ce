//! Nimbus function server.
//!
//! Thin dispatch adapters in front of a [`nimbus_core::Runtime`].
//!
//! # Architecture
//!
//! The server consists of:
//! - **Routes**: `GET /_/healthz` and `ANY /{*path}` invoking functions by name
//! - **WebSocket**: `GET /_/ws`, events dispatched to `__websocket__`
//! - **Watcher**: workspace monitoring driving incremental reload
//! - **Principal**: optional hook populating `ctx.user`

pub mod error;
pub mod principal;
pub mod routes;
pub mod watcher;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use nimbus_core::Runtime;

pub use error::{ServerError, ServerResult};
pub use principal::PrincipalResolver;
pub use routes::{AppState, MAX_FUNCTION_NAME_LENGTH, create_router};
pub use watcher::{FileEvent, FileWatcher};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Reload functions when workspace files change.
    pub watch: bool,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2342,
            watch: false,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Serve an initialized runtime until Ctrl+C.
pub async fn serve(runtime: Runtime, config: ServerConfig) -> ServerResult<()> {
    serve_with_state(AppState::new(runtime), config).await
}

/// Like [`serve`], with a prepared [`AppState`] (e.g. carrying a principal hook).
pub async fn serve_with_state(state: AppState, config: ServerConfig) -> ServerResult<()> {
    let runtime = state.runtime.clone();
    let app = create_router(Arc::new(state), config.max_body_bytes);

    let watcher_task = if config.watch {
        let mut watcher = FileWatcher::new(
            &runtime.config().workspace_path,
            &runtime.config().source_extension,
        )?;
        tracing::info!(
            "Watching {} for changes",
            runtime.config().workspace_path.display()
        );
        Some(tokio::spawn(async move {
            while let Some(event) = watcher.recv().await {
                let runtime = runtime.clone();
                let _ = tokio::task::spawn_blocking(move || apply_file_event(&runtime, event)).await;
            }
        }))
    } else {
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::Address(format!("{}:{}", config.host, config.port)))?;

    tracing::info!("Starting Nimbus server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    if let Some(task) = watcher_task {
        task.abort();
        let _ = task.await;
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Apply one workspace change to the runtime.
pub fn apply_file_event(runtime: &Runtime, event: FileEvent) {
    match event {
        FileEvent::Modified(path) => {
            if let Err(e) = runtime.reload_path(&path) {
                tracing::debug!(path = %path.display(), "watch event not applied: {e}");
            }
        }
        FileEvent::Removed(path) => {
            runtime.remove_path(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 2342);
        assert!(!config.watch);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_file_events_update_runtime() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("greet.ns");
        std::fs::write(&path, "export default fn() { return 'v1' }").unwrap();
        let runtime = Runtime::new(nimbus_core::RuntimeConfig::new(dir.path()));
        runtime.initialize().unwrap();

        std::fs::write(&path, "export default fn( {").unwrap();
        apply_file_event(&runtime, FileEvent::Modified(path.clone()));
        let ctx = nimbus_core::InvocationContext::new("greet");
        let result = runtime.invoke("greet", &ctx, false).unwrap();
        assert_eq!(result.data(), Some(&nimbus_core::Value::from("v1")));

        std::fs::write(&path, "export default fn() { return 'v2' }").unwrap();
        apply_file_event(&runtime, FileEvent::Modified(path.clone()));
        let result = runtime.invoke("greet", &ctx, false).unwrap();
        assert_eq!(result.data(), Some(&nimbus_core::Value::from("v2")));

        apply_file_event(&runtime, FileEvent::Removed(path));
        assert!(!runtime.functions().has("greet"));
    }
}
