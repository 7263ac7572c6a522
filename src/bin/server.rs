//! SimpleBrain agent server binary
//!
//! Usage:
//!   MODEL_PATH=/models/phi-3-mini.gguf simplebrain-server [config.toml]

use anyhow::{Context, Result};
use clap::Parser;
use simplebrain::api::{create_router, ApiState};
use simplebrain::runner::{diagnose, LlamaCppRunner};
use simplebrain::{AgentConfig, ExecutionPolicy};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simplebrain-server", version, about = "SimpleBrain LLM API server")]
struct Args {
    /// Optional TOML config; environment variables override it
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting SimpleBrain server v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load(args.config.as_deref())
        .and_then(AgentConfig::apply_env)
        .context("Failed to load configuration")?;

    // Missing model is fatal here so operators don't find out per request
    let model_path = match config.validate() {
        Ok(path) => path.to_path_buf(),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    for issue in diagnose(Some(&model_path), &config.inference.executable_paths).await {
        if issue.is_warning() {
            warn!(issue = %issue, "Setup issue");
        } else {
            error!(issue = %issue, "Setup issue");
        }
    }

    if config.execution_policy == ExecutionPolicy::Enabled {
        warn!("Command execution is ENABLED: model output will be run as shell commands");
    }

    info!(
        model = %model_path.display(),
        instance = config.instance_name,
        model_type = config.model_type,
        timeout_secs = config.inference.timeout_secs,
        "Loaded configuration"
    );

    let runner = Arc::new(LlamaCppRunner::new(&model_path, config.inference.clone()));
    let port = config.api_port;
    let state = Arc::new(ApiState::new(config, runner));
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
