//! Nimbus CLI - serverless function runtime.

mod colors;
mod invoke;
mod list;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nimbus_core::{Runtime, RuntimeConfig};

/// Interpreter recursion runs on worker and blocking threads.
const THREAD_STACK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Serverless function runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Functions workspace (overrides WORKSPACE_PATH)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the workspace over HTTP and WebSocket
    Serve {
        /// Host address to bind to
        #[arg(long, env = "NIMBUS_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, env = "NIMBUS_PORT", default_value = "2342")]
        port: u16,

        /// Reload functions when files change
        #[arg(long)]
        watch: bool,
    },

    /// Invoke one function and print its result envelope
    Invoke {
        /// Function name, e.g. `api/users`
        name: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query")]
        queries: Vec<String>,

        /// Header as name:value (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body; parsed as JSON when possible
        #[arg(short, long)]
        body: Option<String>,

        /// Request method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Skip the `__interceptor__` function
        #[arg(long)]
        no_interceptor: bool,
    },

    /// List the functions in the workspace
    List,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = RuntimeConfig::from_env()?;
    if let Some(workspace) = cli.workspace {
        config.workspace_path = workspace;
    }
    let runtime = Runtime::new(config);

    let tokio = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(THREAD_STACK_SIZE)
        .build()?;

    match cli.command {
        Commands::Serve { host, port, watch } => {
            tokio.block_on(serve::execute(runtime, host, port, watch))?;
        }

        Commands::Invoke {
            name,
            queries,
            headers,
            body,
            method,
            no_interceptor,
        } => {
            let request = invoke::Request {
                queries,
                headers,
                body,
                method,
                use_interceptor: !no_interceptor,
            };
            let ok = tokio.block_on(async move {
                tokio::task::spawn_blocking(move || invoke::execute(&runtime, &name, request)).await
            })??;
            if !ok {
                std::process::exit(1);
            }
        }

        Commands::List => list::execute(&runtime)?,
    }

    Ok(())
}
