//! Steward CLI: the main entry point.
//!
//! Commands:
//! - `agent`      Interactive chat or single-message mode
//! - `functions`  List the functions the model may call
//! - `history`    Inspect stored conversation histories
//! - `doctor`     Diagnose configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "steward",
    about = "Steward: a personal conversational-agent runtime",
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
    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List the built-in functions
    Functions {
        /// Print the definitions sent to the backend, as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect stored conversation histories
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List sessions with a stored history
    List,
    /// Print one session's history
    Show {
        /// Session (chat) id
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
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
        Commands::Agent { message } => commands::agent::run(message).await?,
        Commands::Functions { json } => commands::functions::run(json)?,
        Commands::History { action } => match action {
            HistoryAction::List => commands::history::list().await?,
            HistoryAction::Show { key } => commands::history::show(&key).await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
