//! ask-llm - Query one of several SimpleBrain agent instances
//!
//! Usage:
//!   ask-llm <instance> "question"
//!   ask-llm --health [instance]
//!   ask-llm --interactive
//!
//! Example:
//!   ask-llm coding "Write a Rust function that reverses a string"

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use simplebrain::client::{
    executed, AgentClient, ClientError, HealthProbe, Instance, InstanceRegistry, ASK_TIMEOUT,
    HEALTH_TIMEOUT,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "ask-llm", disable_help_flag = true)]
struct Args {
    /// LLM instance name
    instance: Option<String>,

    /// Question to ask
    question: Vec<String>,

    /// Check health of all instances, or of one
    #[arg(long, num_args = 0..=1, default_missing_value = "all")]
    health: Option<String>,

    /// Start interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// Host running the instances
    #[arg(long, default_value = "localhost")]
    host: String,

    /// TOML file with [[instance]] tables replacing the built-in set
    #[arg(long)]
    instances: Option<PathBuf>,

    /// Show help
    #[arg(short, long)]
    help: bool,
}

fn print_usage(registry: &InstanceRegistry) {
    println!("{}\n", "SimpleBrain Multi-LLM Client".cyan());

    println!("{}", "Available LLM instances:".blue());
    for instance in registry.iter() {
        println!(
            "  {} (Port: {}) - {} - {}",
            format!("{:<8}", instance.name).cyan(),
            instance.port.to_string().yellow(),
            instance.model,
            instance.description
        );
    }

    println!("\n{}", "Usage:".blue());
    println!("  ask-llm <instance> \"question\"");
    println!("  ask-llm --health [instance]");
    println!("  ask-llm --interactive");

    println!("\n{}", "Examples:".blue());
    println!("  ask-llm general \"What is machine learning?\"");
    println!("  ask-llm coding \"Write a Rust sorting function\"");
    println!("  ask-llm chat \"Tell me a story about robots\"");
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn check_health(registry: &InstanceRegistry, host: &str, only: Option<&str>) {
    println!("{}\n", "🔍 Checking LLM instance health...".cyan());

    let targets: Vec<&Instance> = match only {
        Some(name) => match registry.get(name) {
            Some(instance) => vec![instance],
            None => {
                println!("{}", format!("Error: Unknown instance '{}'", name).red());
                return;
            }
        },
        None => registry.iter().collect(),
    };

    for instance in targets {
        println!(
            "{}",
            format!(
                "{} ({}) - Port {}:",
                title_case(&instance.name),
                instance.model,
                instance.port
            )
            .blue()
        );

        let probe = match AgentClient::new(instance.url(host), HEALTH_TIMEOUT) {
            Ok(client) => client.health().await,
            Err(e) => Err(e),
        };

        match probe {
            Ok(HealthProbe::Report { status, health }) if status.is_success() => {
                println!(
                    "  Status: {}, Model: {}",
                    health.status, health.environment.model_type
                );
            }
            Ok(HealthProbe::Report { status, health }) => {
                println!("  Status: HTTP {} ({})", status.as_u16(), health.status);
                if !health.model_exists {
                    println!("  {}", "Model file missing".yellow());
                }
                if !health.llama_exists {
                    println!("  {}", "llama.cpp executable missing".yellow());
                }
            }
            Ok(HealthProbe::Status(status)) => println!("  Status: HTTP {}", status.as_u16()),
            Err(_) => println!("  Status: offline or error"),
        }
        println!();
    }
}

/// Send one question; returns false when the request failed
async fn ask(instance: &Instance, host: &str, question: &str) -> bool {
    println!(
        "{} {}",
        format!("🤖 Asking {} ({}):", instance.model, instance.name).cyan(),
        question
    );
    println!(
        "{}\n",
        format!("📡 Connecting to port {}...", instance.port).blue()
    );

    let result = match AgentClient::new(instance.url(host), ASK_TIMEOUT) {
        Ok(client) => client.ask(question).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => {
            println!("{}", "🤖 Response:".green());
            println!("{}", response.llm_response);

            if let Some(command) = executed(&response) {
                println!("\n{} {}", "🔧 Command executed:".yellow(), command);
                let output = response.command_result.as_deref().filter(|o| !o.is_empty());
                if let Some(output) = output {
                    println!("{}", "📋 Result:".blue());
                    println!("{}", output);
                }
            }
            true
        }
        Err(ClientError::Http { status, body }) => {
            println!("{}", format!("Error: HTTP {}", status.as_u16()).red());
            println!("{}", body);
            false
        }
        Err(ClientError::Timeout) => {
            println!("{}", "Error: Request timed out".red());
            println!(
                "{}",
                "The model may be loading or processing. Try again in a moment.".yellow()
            );
            false
        }
        Err(ClientError::Connection(e)) => {
            println!("{}", format!("Connection error: {}", e).red());
            false
        }
        Err(ClientError::Json(e)) => {
            println!("{}", format!("JSON error: {}", e).red());
            false
        }
    }
}

/// Instance name from a `switch <name>` line; the keyword is case-insensitive
fn switch_target(input: &str) -> Option<&str> {
    let (keyword, rest) = input.split_once(char::is_whitespace)?;
    keyword
        .eq_ignore_ascii_case("switch")
        .then(|| rest.trim())
        .filter(|name| !name.is_empty())
}

async fn interactive(registry: &InstanceRegistry, host: &str) -> Result<()> {
    println!("{}", "🤖 SimpleBrain Multi-LLM Interactive Chat".cyan());
    println!("Available instances: {}", registry.names().join(", "));
    println!("Type 'switch <instance>' to change LLM, 'health' to check status, or 'quit' to exit");
    println!("{}", "=".repeat(60));

    let Some(mut current) = registry.first() else {
        anyhow::bail!("No instances configured");
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n💬 You ({}): ", current.name);
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\n👋 Goodbye!");
            break;
        };

        let input = line.trim();
        let lowered = input.to_lowercase();

        if matches!(lowered.as_str(), "quit" | "exit" | "q") {
            println!("👋 Goodbye!");
            break;
        }

        if lowered == "health" {
            check_health(registry, host, None).await;
            continue;
        }

        if let Some(name) = switch_target(input) {
            match registry.get(name) {
                Some(instance) => {
                    current = instance;
                    println!(
                        "{}",
                        format!("Switched to {} ({})", current.name, current.model).green()
                    );
                }
                None => println!(
                    "{}",
                    format!("Invalid instance. Available: {}", registry.names().join(", ")).red()
                ),
            }
            continue;
        }

        if input.is_empty() {
            continue;
        }

        ask(current, host, input).await;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let registry = match &args.instances {
        Some(path) => InstanceRegistry::load(path)?,
        None => InstanceRegistry::default(),
    };

    if args.help || (args.instance.is_none() && args.health.is_none() && !args.interactive) {
        print_usage(&registry);
        return Ok(());
    }

    if let Some(target) = args.health.as_deref() {
        let only = (target != "all").then_some(target);
        check_health(&registry, &args.host, only).await;
        return Ok(());
    }

    if args.interactive {
        return interactive(&registry, &args.host).await;
    }

    let instance_name = args.instance.as_deref().unwrap_or_default();
    let question = args.question.join(" ");
    if question.trim().is_empty() {
        println!("{}", "Error: Both instance and question are required".red());
        print_usage(&registry);
        std::process::exit(1);
    }

    let Some(instance) = registry.get(instance_name) else {
        println!(
            "{}",
            format!("Error: Invalid instance '{}'", instance_name).red()
        );
        println!("Available instances: {}", registry.names().join(", "));
        std::process::exit(1);
    };

    if !ask(instance, &args.host, &question).await {
        std::process::exit(1);
    }

    Ok(())
}
