use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use dejaview::config::Config;

/// Dejaview: repost detection for Telegram group chats.
///
/// Fingerprints every image posted in monitored chats and replies with a
/// link to the previous occurrence when one comes around again.
#[derive(Parser)]
#[command(name = "dejaview", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (long-polls until interrupted)
    Run,

    /// Fingerprint a local image file
    Hash {
        /// Path to the image
        path: PathBuf,
    },

    /// Show a summary of the state file
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dejaview=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = Config::load()?;
            config.require_token()?;
            dejaview::bot::run(config).await?;
        }

        Commands::Hash { path } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let fingerprint = dejaview::hash::dhash(&bytes)?;
            println!("{}  {}", fingerprint.to_string().bold(), path.display());
        }

        Commands::Status => {
            let config = Config::load()?;
            dejaview::status::show(&config.state_path)?;
        }
    }

    Ok(())
}
