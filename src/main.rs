use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod agent;
mod config;
mod runtime;
mod sandbox;
mod templates;

use agent::CodexAgent;
use config::Config;
use runtime::DockerRuntime;
use sandbox::Sandbox;

const DEFAULT_PROMPT: &str = "Create a simple hello world web app";

#[derive(Parser)]
#[command(name = "swea")]
#[command(
    author,
    version,
    about = "Run the Codex agent inside a reusable Docker sandbox"
)]
struct Cli {
    /// Free-text prompt for the agent (defaults to a sample prompt)
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,

    /// Docker image for the sandbox
    #[arg(long)]
    image: Option<String>,

    /// Sandbox name (the reuse key)
    #[arg(long)]
    name: Option<String>,

    /// Per-command timeout in seconds before the agent is reaped
    #[arg(long)]
    timeout: Option<u64>,

    /// Re-sync configuration into a running sandbox and exit
    #[arg(long)]
    reinit: bool,

    /// Stop and remove the sandbox container, then exit
    #[arg(long)]
    remove: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("swea=debug")
    } else {
        EnvFilter::new("swea=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cwd = std::env::current_dir()?;
    let mut config = Config::load(&cwd)?;

    if let Some(image) = cli.image {
        config.sandbox.image = image;
    }
    if let Some(name) = cli.name {
        config.sandbox.name = name;
    }
    if let Some(timeout) = cli.timeout {
        config.agent.command_timeout_secs = timeout;
    }

    info!("Starting Docker sandbox...");
    let runtime = DockerRuntime::connect().await?;
    let api_key = std::env::var("GOOGLE_API_KEY").ok();
    let mut sandbox =
        Sandbox::new(runtime, config.sandbox.to_spec()).with_api_key(api_key);

    if cli.remove {
        sandbox.remove().await?;
        println!("{} Sandbox removed.", "✓".green());
        return Ok(());
    }

    if cli.reinit {
        sandbox.reinitialize().await?;
        println!("{} Sandbox configuration re-synced.", "✓".green());
        return Ok(());
    }

    let prompt = if cli.prompt.is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        cli.prompt.join(" ")
    };

    // Moved into the scoped closure: the future it returns may only
    // borrow the sandbox, so the agent must be owned, not borrowed.
    let agent = CodexAgent::new(&config.agent);
    let prompt_for_task = prompt.clone();

    info!("Running Codex with prompt: {prompt}");
    let result = sandbox
        .run_scoped(move |sb| {
            Box::pin(async move {
                if sb.was_reused() {
                    info!("Using existing container");
                } else {
                    info!("Created new container");
                }
                agent.run(sb, &prompt_for_task).await
            })
        })
        .await?;

    if result.success() {
        println!("\n{}", "━".repeat(60).dimmed());
        println!("{}", "Codex Output".green().bold());
        println!("{}", "━".repeat(60).dimmed());
        println!("{}", result.stdout);
    } else {
        println!("\n{}", "━".repeat(60).dimmed());
        println!("{}", "Codex Error".red().bold());
        println!("{}", "━".repeat(60).dimmed());
        eprintln!("{}", result.stderr);
        std::process::exit(1);
    }

    Ok(())
}
