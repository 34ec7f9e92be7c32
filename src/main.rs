use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recall_srs::{Grade, PracticeMode};

mod commands;

/// Recall - spaced-repetition vocabulary trainer
#[derive(Parser)]
#[command(name = "recall")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Spaced-repetition scheduling for vocabulary study", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory (defaults to $RECALL_HOME, ./.recall or ~/.recall)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and default configuration
    Init,

    /// Add a word to study
    Add {
        word: String,
        /// Level tag, e.g. a1 or b2
        #[arg(long, default_value = "general")]
        level: String,
        /// Comma-separated surface forms, e.g. went,gone
        #[arg(long, value_delimiter = ',')]
        forms: Vec<String>,
    },

    /// Remove a word and its history
    Remove {
        id: String,
    },

    /// List every word with its scheduling state
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show the items due now
    Due {
        /// scheduled or endless (defaults to the current mode)
        #[arg(long)]
        mode: Option<PracticeMode>,
        #[arg(long)]
        json: bool,
    },

    /// Grade a card: the given id, or the current session card
    Answer {
        /// correct or incorrect
        grade: Grade,
        #[arg(long)]
        id: Option<String>,
    },

    /// Start a new practice session in the current mode
    Start,

    /// Show the current session card
    Next,

    /// Show or switch the practice mode
    Mode {
        mode: Option<PracticeMode>,
    },

    /// Show statistics for one item, or a summary of all
    Stats {
        id: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Upgrade a saved state file to the current schema
    Migrate {
        /// State file to read
        #[arg(long)]
        input: PathBuf,
        /// Where to write the result (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show data directory, storage and today's quotas
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // stdout carries command output only
        .init();

    let data_dir = recall_srs::storage::get_data_dir(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Init => {
            info!("Initializing recall");
            commands::init(&data_dir)?;
        }
        Commands::Add { word, level, forms } => {
            commands::add(&data_dir, &word, &level, forms)?;
        }
        Commands::Remove { id } => {
            commands::remove(&data_dir, &id)?;
        }
        Commands::List { json } => {
            commands::list(&data_dir, json)?;
        }
        Commands::Due { mode, json } => {
            commands::due(&data_dir, mode, json)?;
        }
        Commands::Answer { grade, id } => {
            commands::answer(&data_dir, grade, id.as_deref())?;
        }
        Commands::Start => {
            commands::start(&data_dir)?;
        }
        Commands::Next => {
            commands::next(&data_dir)?;
        }
        Commands::Mode { mode } => {
            commands::mode(&data_dir, mode)?;
        }
        Commands::Stats { id, json } => {
            commands::stats(&data_dir, id.as_deref(), json)?;
        }
        Commands::Migrate { input, output } => {
            commands::migrate(&data_dir, &input, output.as_deref())?;
        }
        Commands::Status => {
            commands::status(&data_dir)?;
        }
    }

    Ok(())
}
