mod modes;
mod repl;
mod session;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ragbot", about = "Retrieval-augmented chat over your documents")]
struct Cli {
    /// Config file (defaults to ~/.ragbot/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask questions about one document collection
    Chat {
        /// File or directory to index (repeatable; defaults to the configured sources)
        #[arg(short, long = "doc")]
        docs: Vec<PathBuf>,

        /// Maximum number of segments placed in the prompt
        #[arg(long)]
        max_results: Option<usize>,

        /// Minimum similarity score of a retrieved segment
        #[arg(long)]
        min_score: Option<f32>,
    },
    /// Let the model pick the relevant collection among the configured sources
    Route,
    /// Compare an assistant using query compression with a basic one
    Advanced {
        /// File or directory to index (repeatable; defaults to the configured sources)
        #[arg(short, long = "doc")]
        docs: Vec<PathBuf>,
    },
    /// Combine local documents with live web search
    Hybrid {
        /// File or directory to index (repeatable; defaults to the configured sources)
        #[arg(short, long = "doc")]
        docs: Vec<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            ragbot_config::load_env();
            ragbot_config::load_config_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => ragbot_config::load_config().context("Failed to load config")?,
    };

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async move {
        match cli.command {
            Commands::Chat {
                docs,
                max_results,
                min_score,
            } => modes::run_chat(config, docs, max_results, min_score).await,
            Commands::Route => modes::run_route(config).await,
            Commands::Advanced { docs } => modes::run_advanced(config, docs).await,
            Commands::Hybrid { docs } => modes::run_hybrid(config, docs).await,
            Commands::Config => Ok(()),
        }
    });
    // Don't wait for in-flight requests abandoned on Ctrl+C
    rt.shutdown_background();
    result
}
