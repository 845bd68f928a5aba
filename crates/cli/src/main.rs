//! Orcha CLI, the main entry point.
//!
//! Commands:
//! - `run`      Run one prompt through the orchestration loop
//! - `tools`    List the built-in tools as JSON schemas
//! - `pricing`  Show the pricing table or resolve one model's rates
//! - `config`   Print the effective configuration (secrets redacted)

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "orcha",
    about = "Orcha: tool-calling orchestration for LLM APIs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prompt with the built-in tools
    Run {
        /// The user prompt
        prompt: String,

        /// Override the model
        #[arg(short, long)]
        model: Option<String>,

        /// Override the provider (openai, openrouter, anthropic, ollama, ...)
        #[arg(short, long)]
        provider: Option<String>,

        /// Override the iteration cap
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Stream the answer as it is generated
        #[arg(long)]
        stream: bool,

        /// Print the full execution result as JSON
        #[arg(long)]
        json: bool,

        /// Use a scripted provider instead of calling an API
        #[arg(long)]
        dry_run: bool,
    },

    /// List built-in tool definitions
    Tools,

    /// Show model pricing
    Pricing {
        /// Resolve the rates for one model
        model: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            prompt,
            model,
            provider,
            max_iterations,
            stream,
            json,
            dry_run,
        } => {
            commands::run::run(commands::run::RunArgs {
                prompt,
                model,
                provider,
                max_iterations,
                stream,
                json,
                dry_run,
            })
            .await?
        }
        Commands::Tools => commands::tools::run()?,
        Commands::Pricing { model } => commands::pricing::run(model.as_deref())?,
        Commands::Config { path } => {
            if path {
                commands::config_cmd::path()
            } else {
                commands::config_cmd::show()?
            }
        }
    }

    Ok(())
}
