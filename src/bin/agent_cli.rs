//! agent-cli - Chat with a single SimpleBrain agent
//!
//! Usage:
//!   agent-cli [--url <URL>] [PROMPT...]
//!
//! With a prompt, asks once and exits. Without one, starts a REPL.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use simplebrain::api::AgentResponse;
use simplebrain::client::{executed, AgentClient, ClientError};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "agent-cli", version, about = "Local LLM agent CLI")]
struct Args {
    /// Agent server base URL
    #[arg(short, long, default_value = "http://localhost:5001")]
    url: String,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Prompt for single-question mode
    prompt: Vec<String>,
}

fn describe(error: &ClientError) -> String {
    match error {
        ClientError::Http { status, .. } => format!("Error: HTTP {}", status.as_u16()),
        ClientError::Timeout => "Error: Request timed out".to_string(),
        ClientError::Connection(e) => format!("Connection error: {}", e),
        ClientError::Json(e) => format!("JSON error: {}", e),
    }
}

fn print_command(response: &AgentResponse) {
    if let Some(command) = executed(response) {
        println!("🔧 Command executed: {}", command.yellow());
        if let Some(output) = response.command_result.as_deref().filter(|o| !o.is_empty()) {
            println!("📋 Result: {}", output);
        }
    }
}

async fn repl(client: &AgentClient) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n💬 You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\n👋 Goodbye!");
            break;
        };

        let prompt = line.trim();
        if matches!(prompt.to_lowercase().as_str(), "quit" | "exit" | "q") {
            println!("👋 Goodbye!");
            break;
        }
        if prompt.is_empty() {
            continue;
        }

        print!("🤖 Agent: ");
        std::io::stdout().flush()?;

        match client.ask(prompt).await {
            Ok(response) => {
                println!("{}", response.llm_response);
                print_command(&response);
            }
            Err(e) => println!("{}", describe(&e).red()),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = AgentClient::new(&args.url, Duration::from_secs(args.timeout))?;

    println!("{}", "🤖 Local LLM Agent CLI".cyan());
    println!("Type 'quit', 'exit', or press Ctrl+C to exit");
    println!("{}", "=".repeat(50));

    if !args.prompt.is_empty() {
        let prompt = args.prompt.join(" ");
        println!("\n💬 You: {}", prompt);
        match client.ask(&prompt).await {
            Ok(response) => {
                println!("🤖 Agent: {}", response.llm_response);
                print_command(&response);
            }
            Err(e) => {
                println!("🤖 Agent: {}", describe(&e).red());
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    repl(&client).await
}
