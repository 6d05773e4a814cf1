//! verlock CLI
//!
//! Command-line tools for verlock stores.
//!
//! # Commands
//!
//! - `demo` - Replay the shared lock scenarios with three concurrent users
//! - `inspect` - Display tables and version tokens of a file store
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// verlock command-line tools.
#[derive(Parser)]
#[command(name = "verlock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the shared lock scenarios with three users
    Demo {
        /// Run a single scenario (1, 2 or 3) instead of all of them
        #[arg(short, long)]
        scenario: Option<u8>,
    },

    /// Display tables and version tokens of a file store
    Inspect {
        /// List every version token
        #[arg(long)]
        versions: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo { scenario } => {
            commands::demo::run(cli.path.as_deref(), scenario)?;
        }
        Commands::Inspect { versions, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, versions, &format)?;
        }
        Commands::Version => {
            println!("verlock CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("verlock Core v{}", verlock_core::VERSION);
        }
    }

    Ok(())
}
