//! RangeDB CLI
//!
//! Command-line tools for RangeDB database homes.
//!
//! # Commands
//!
//! - `inspect` - Display tables, timestamps and checkpoints
//! - `verify` - Verify checkpoint image integrity
//! - `scan` - Print records through a bounded cursor
//! - `rollback` - Roll a checkpoint back to its stable timestamp

mod commands;

use clap::{Parser, Subcommand};
use commands::scan::ScanOptions;
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RangeDB command-line database tools.
#[derive(Parser)]
#[command(name = "rangedb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database home directory
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
    /// Display tables, timestamps and checkpoints
    Inspect {
        /// Show every checkpoint
        #[arg(short, long)]
        checkpoints: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Verify checkpoint image integrity
    Verify {
        /// Only verify this checkpoint
        #[arg(short, long)]
        checkpoint: Option<String>,
    },

    /// Print records of a table through a bounded cursor
    Scan {
        /// Table or index URI, e.g. table:orders
        table: String,

        /// Read this checkpoint instead of the recovered live data
        #[arg(short, long)]
        checkpoint: Option<String>,

        /// Lower bound key
        #[arg(long)]
        lower: Option<String>,

        /// Upper bound key
        #[arg(long)]
        upper: Option<String>,

        /// Exclude the lower bound key
        #[arg(long)]
        lower_exclusive: bool,

        /// Exclude the upper bound key
        #[arg(long)]
        upper_exclusive: bool,

        /// Read timestamp (hexadecimal)
        #[arg(short, long)]
        read_timestamp: Option<String>,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Walk from the upper end
        #[arg(long)]
        reverse: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Roll a checkpoint back to its stable timestamp
    Rollback {
        /// Checkpoint to recover from (default: the newest)
        #[arg(short, long)]
        checkpoint: Option<String>,

        /// Checkpoint to write the result to (default: the source)
        #[arg(short, long)]
        target: Option<String>,

        /// Dry run - show what would be removed
        #[arg(short, long)]
        dry_run: bool,
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
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect {
            checkpoints,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, checkpoints, format)?;
        }
        Commands::Verify { checkpoint } => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path, checkpoint.as_deref())?;
        }
        Commands::Scan {
            table,
            checkpoint,
            lower,
            upper,
            lower_exclusive,
            upper_exclusive,
            read_timestamp,
            limit,
            reverse,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for scan")?;
            let options = ScanOptions {
                table,
                checkpoint,
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
                read_timestamp,
                limit,
                reverse,
            };
            commands::scan::run(&path, &options, format)?;
        }
        Commands::Rollback {
            checkpoint,
            target,
            dry_run,
        } => {
            let path = cli.path.ok_or("Database path required for rollback")?;
            commands::rollback::run(&path, checkpoint.as_deref(), target.as_deref(), dry_run)?;
        }
        Commands::Version => {
            println!("RangeDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("RangeDB Core v{}", rangedb_core::VERSION);
        }
    }

    Ok(())
}
