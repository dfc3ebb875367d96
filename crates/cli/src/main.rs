mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use runtime::{ChatEvent, ChatOutcome, Gateway, Message, ToolResult};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::Result;

const SYSTEM_PROMPT: &str = "You are a helpful assistant";
const CONFIG_FILE: &str = "tiller.toml";

#[derive(Parser)]
#[command(name = "tiller")]
#[command(about = "A multi-provider, tool-augmented chat gateway", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Tool-call steps allowed per message
        #[arg(long, default_value_t = runtime::DEFAULT_MAX_STEPS)]
        max_steps: usize,
    },
    /// Connect the configured tool servers and list their tools
    Tools,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(|| CONFIG_FILE.into());

    match cli.command {
        Some(Commands::Chat { max_steps }) => cmd_chat(&config_path, max_steps).await,
        Some(Commands::Tools) => cmd_tools(&config_path).await,
        None => cmd_chat(&config_path, runtime::DEFAULT_MAX_STEPS).await,
    }
}

async fn connect_tool_servers(gateway: &Gateway, config: &Config) -> Result<()> {
    for server in &config.tool_servers {
        let spec = server.launch_spec()?;
        match gateway.add_tool_server(spec).await {
            Ok(count) => println!("Connected {} ({count} tools)", server.name),
            Err(e) => eprintln!("Skipping {}: {e}", server.name),
        }
    }
    Ok(())
}

async fn cmd_chat(config_path: &PathBuf, max_steps: usize) -> Result<()> {
    println!("tiller v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(config_path)?;
    let gateway = Gateway::new(config.launch.clone()).with_system(SYSTEM_PROMPT);
    gateway.assign_model(
        &config.provider.kind,
        &config.provider.model,
        &config.credential()?,
    )?;
    connect_tool_servers(&gateway, &config).await?;

    if let Some(selection) = gateway.selection() {
        println!("Provider: {selection}");
    }
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut history: Vec<Message> = Vec::new();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        history.push(Message::user(input));
        let mut stream = gateway.chat(history.clone(), max_steps)?;

        let mut reply = String::new();
        println!();
        while let Some(event) = stream.next().await {
            match event {
                ChatEvent::TextDelta(delta) => {
                    print!("{delta}");
                    stdout.flush()?;
                    reply.push_str(&delta);
                }
                ChatEvent::ToolCallStarted(call) => {
                    println!("\n[tool] {} {}", call.name, call.input);
                }
                ChatEvent::ToolResult(ToolResult::Success { .. }) => {
                    println!("[tool] ok");
                }
                ChatEvent::ToolResult(ToolResult::Failure { error, .. }) => {
                    println!("[tool] failed: {error}");
                }
                ChatEvent::Done(ChatOutcome::Completed) => {}
                ChatEvent::Done(ChatOutcome::StepLimitExceeded { steps }) => {
                    println!("\n[stopped after {steps} steps]");
                }
                ChatEvent::Error(e) => {
                    eprintln!("\nError: {e}");
                }
            }
        }
        println!("\n");

        if !reply.is_empty() {
            history.push(Message::assistant(reply));
        }
    }

    gateway.shutdown().await;
    println!("\nBye.");
    Ok(())
}

async fn cmd_tools(config_path: &PathBuf) -> Result<()> {
    let config = Config::load(config_path)?;
    // Listing tools needs no provider, only the connectors.
    let gateway = Gateway::new(config.launch.clone());
    connect_tool_servers(&gateway, &config).await?;

    let mut tools = gateway.tools();
    tools.sort_by(|a, b| a.name.cmp(&b.name));

    if tools.is_empty() {
        println!("No tools registered.");
    } else {
        println!("{:<32}  DESCRIPTION", "NAME");
        println!("{}", "-".repeat(72));
        for tool in tools {
            let description = tool.description.lines().next().unwrap_or_default();
            println!("{:<32}  {description}", tool.name);
        }
    }

    gateway.shutdown().await;
    Ok(())
}
