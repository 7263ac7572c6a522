//! simplebrain-check - Validate the local llama.cpp setup
//!
//! Reads the same configuration as the server, reports setup issues and,
//! when asked, runs a test prompt through the real runner.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use simplebrain::runner::{
    diagnose, has_blocking, InferenceOutcome, LlamaCppRunner, ModelRunner,
};
use simplebrain::AgentConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simplebrain-check", version, about = "Validate the LLM setup")]
struct Args {
    /// Optional TOML config; environment variables override it
    config: Option<PathBuf>,

    /// Prompt to send once the setup looks good
    #[arg(short, long, default_value = "Hello, please say hi back.")]
    prompt: String,

    /// Only run the diagnostics
    #[arg(long)]
    no_prompt: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = AgentConfig::load(args.config.as_deref())
        .and_then(AgentConfig::apply_env)
        .context("Failed to load configuration")?;

    println!("Testing LLM setup...");
    let issues = diagnose(
        config.model_path.as_deref(),
        &config.inference.executable_paths,
    )
    .await;

    if !issues.is_empty() {
        println!("{}", "Issues found:".yellow());
        for issue in &issues {
            let level = if issue.is_warning() {
                "warning".yellow()
            } else {
                "error".red()
            };
            println!("  - {}: {}", level, issue);
        }
    }

    if has_blocking(&issues) {
        std::process::exit(1);
    }

    if issues.is_empty() {
        println!("{}", "LLM setup looks good!".green());
    }
    if args.no_prompt {
        return Ok(());
    }

    let Some(runner) = LlamaCppRunner::from_config(&config) else {
        anyhow::bail!("MODEL_PATH environment variable not set");
    };

    println!("\nTesting simple prompt...");
    match runner.generate(&args.prompt).await {
        InferenceOutcome::Success(text) => println!("Response: {}", text),
        other => {
            println!("{} {}", "Error:".red(), other);
            std::process::exit(1);
        }
    }

    Ok(())
}
