//! iol-vergence - IOL power prediction and lens-constant optimization
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API (default subcommand)
//! cargo run --release
//! cargo run --release -- serve --addr 127.0.0.1:9000
//!
//! # Calculate a request offline
//! ./iol-vergence preop request.json
//! cat request.json | ./iol-vergence postop -
//!
//! # Validate a config file
//! ./iol-vergence check-config engine_config.toml
//! ```
//!
//! # Environment Variables
//!
//! - `IOL_ENGINE_CONFIG`: Path to the engine config TOML
//! - `IOL_CORS_ORIGINS`: Comma-separated allowed CORS origins (default: any)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use iol_vergence::api::{create_app, ApiState};
use iol_vergence::config::{self, EngineConfig};
use iol_vergence::engine;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "iol-vergence")]
#[command(about = "IOL vergence prediction and lens-constant optimization engine")]
#[command(version)]
struct CliArgs {
    /// Engine config TOML (overrides IOL_ENGINE_CONFIG and ./engine_config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Serve the HTTP API
    Serve {
        /// Override the server address (default: server.addr from config)
        #[arg(short, long, value_name = "HOST:PORT")]
        addr: Option<String>,
    },

    /// Calculate a preoperative request and print the JSON response
    Preop {
        /// Request file, or "-" for stdin
        input: String,
    },

    /// Calculate a postoperative request and print the JSON response
    Postop {
        /// Request file, or "-" for stdin
        input: String,
    },

    /// Load and validate a config file, then exit
    CheckConfig {
        /// Path to the TOML file
        path: PathBuf,
    },
}

// ============================================================================
// Subcommands
// ============================================================================

/// Run the HTTP server until Ctrl+C.
async fn run_server(
    cfg: EngineConfig,
    addr: Option<String>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let server_addr = addr.unwrap_or_else(|| cfg.server.addr.clone());
    let api_path = cfg.server.api_path.clone();
    let formula = cfg.formula.kind;
    let app = create_app(ApiState::new(cfg));

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;

    info!(
        addr = %server_addr,
        api_path = %api_path,
        formula = %formula,
        "HTTP server listening"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            info!("[HttpServer] Received shutdown signal");
        })
        .await;

    match result {
        Ok(()) => {
            info!("[HttpServer] Graceful shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("[HttpServer] Server error: {}", e);
            Err(anyhow::anyhow!("HTTP server error: {}", e))
        }
    }
}

/// Read a JSON request from a file or stdin (`-`).
fn read_request(input: &str) -> Result<serde_json::Value> {
    let raw = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))?
    };
    serde_json::from_str(&raw).map_err(|_| engine::RequestError::NotJson.into())
}

fn run_offline(cfg: &EngineConfig, input: &str, postop: bool) -> Result<()> {
    let body = read_request(input)?;
    let output = if postop {
        serde_json::to_string_pretty(&engine::postop(&body, cfg)?)?
    } else {
        serde_json::to_string_pretty(&engine::preop(&body, cfg)?)?
    };
    println!("{output}");
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let cfg = EngineConfig::load_from_file(path)
        .with_context(|| format!("Config {} is invalid", path.display()))?;
    info!(
        path = %path.display(),
        formula = %cfg.formula.kind,
        variables = cfg.variables.len(),
        lens_constants = cfg.lens_constants.len(),
        "Config is valid"
    );
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Some(SubCommand::CheckConfig { path }) = &args.command {
        return check_config(path);
    }

    let engine_config =
        config::resolve(args.config.as_deref()).context("Failed to load engine config")?;

    match args.command {
        Some(SubCommand::Preop { input }) => run_offline(&engine_config, &input, false),
        Some(SubCommand::Postop { input }) => run_offline(&engine_config, &input, true),
        Some(SubCommand::Serve { addr }) => serve(engine_config, addr).await,
        Some(SubCommand::CheckConfig { .. }) => Ok(()),
        None => serve(engine_config, None).await,
    }
}

async fn serve(cfg: EngineConfig, addr: Option<String>) -> Result<()> {
    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    run_server(cfg, addr, cancel_token).await
}
