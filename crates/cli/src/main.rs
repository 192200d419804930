//! Sovwren CLI — the main entry point.
//!
//! Commands:
//! - `chat`     — Interactive cockpit session (the default)
//! - `sessions` — List, rename, or delete stored sessions
//! - `models`   — List models available on the backend
//! - `doctor`   — Diagnose the local setup

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "sovwren",
    about = "Sovwren — a terminal cockpit for a Steward and a local Node",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive cockpit session
    Chat {
        /// Override the local model
        #[arg(short, long)]
        model: Option<String>,

        /// Persona profile to compose with
        #[arg(short, long)]
        profile: Option<String>,

        /// Start a fresh session instead of resuming the last one
        #[arg(long)]
        fresh: bool,
    },

    /// Manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: commands::sessions::Action,
    },

    /// List models available on the backend
    Models,

    /// Diagnose the local setup
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Chat { model, profile, fresh }) => {
            commands::chat::run(model, profile, fresh).await?
        }
        None => commands::chat::run(None, None, false).await?,
        Some(Commands::Sessions { action }) => commands::sessions::run(action).await?,
        Some(Commands::Models) => commands::models::run().await?,
        Some(Commands::Doctor) => commands::doctor::run().await?,
    }

    Ok(())
}
