//! `opencuff` binary entry point: CLI parsing, logging setup, and the MCP
//! stdio server loop around a [`opencuff::manager::PluginManager`].

use std::path::PathBuf;

use clap::Parser;
use opencuff::manager::PluginManager;
use opencuff::mcp::McpHandler;
use opencuff::plugins;
use rmcp::service::serve_server;
use rmcp::transport::stdio;
use tracing_subscriber::filter::EnvFilter;

/// Command-line arguments for the `opencuff` plugin host.
#[derive(Parser, Debug, Clone)]
#[command(name = "opencuff", version, about = "Hot-reloadable MCP plugin host", long_about = None)]
struct Args {
    /// Settings file path. Falls back to `OPENCUFF_SETTINGS`, then
    /// `./settings.yml`, via `Settings::resolve_path` — not read from the
    /// environment here, so a missing `OPENCUFF_SETTINGS` file still falls
    /// through to the default instead of being treated as an explicit path.
    #[arg(long = "settings", value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Log verbosity, used when `RUST_LOG` is unset
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format: human-readable or JSON
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(args: &Args) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone());
    let filter = EnvFilter::new(env_filter);

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let allowed: Vec<String> = plugins::DEFAULT_ALLOWED_PREFIXES
        .iter()
        .map(|s| s.to_string())
        .collect();
    let manager = PluginManager::new(allowed);
    manager.start(args.settings.clone()).await?;

    tracing::info!("Starting MCP stdio server");
    let service = McpHandler {
        manager: manager.clone(),
    };
    let io = stdio();
    let running = match serve_server(service, io).await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "mcp_stdio_startup_failed");
            manager.stop().await;
            return Err(e.into());
        }
    };

    let ct = running.cancellation_token();
    let waiting_fut = running.waiting();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down (Ctrl+C)");
            ct.cancel();
        }
        res = waiting_fut => {
            if let Ok(reason) = res {
                tracing::info!(?reason, "Stdio server stopped");
            }
        }
    }

    manager.stop().await;
    Ok(())
}
