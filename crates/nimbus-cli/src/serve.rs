//! Serve command implementation for Nimbus CLI.
//!
//! Loads the workspace, runs the boot hook, then starts the HTTP and
//! WebSocket server.

use nimbus_core::Runtime;
use nimbus_server::ServerConfig;

use crate::colors;

/// Start the function server.
pub async fn execute(runtime: Runtime, host: String, port: u16, watch: bool) -> anyhow::Result<()> {
    let loaded = {
        let runtime = runtime.clone();
        tokio::task::spawn_blocking(move || runtime.initialize()).await??
    };

    println!("\n{}Nimbus Server{}", colors::BOLD, colors::RESET);
    println!("{}", "─".repeat(50));
    println!(
        "{}  ◆ Workspace:{} {} ({} functions)",
        colors::CYAN,
        colors::RESET,
        runtime.config().workspace_path.display(),
        loaded
    );

    let config = ServerConfig {
        host,
        port,
        watch,
        ..ServerConfig::default()
    };

    println!(
        "{}  ◆ Server:{} http://{}:{}",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    println!(
        "{}  ◆ WebSocket:{} ws://{}:{}/_/ws",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    if watch {
        println!("{}  ◆ Watching for changes{}", colors::DIM, colors::RESET);
    }
    println!("{}", "─".repeat(50));
    println!("{}Press Ctrl+C to stop{}", colors::GREEN, colors::RESET);
    println!();

    nimbus_server::serve(runtime, config).await?;

    Ok(())
}
