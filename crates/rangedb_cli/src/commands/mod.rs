//! CLI command implementations.

pub mod inspect;
pub mod rollback;
pub mod scan;
pub mod verify;

use rangedb_core::{CoreError, Database, DatabaseConfig};
use std::path::Path;
use thiserror::Error;

/// Errors reported by the commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The engine refused an operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// JSON output could not be produced.
    #[error("json output: {0}")]
    Json(#[from] serde_json::Error),

    /// A command-line argument was malformed.
    #[error("{0}")]
    Usage(String),

    /// Verification found damaged checkpoint images.
    #[error("{0} damaged checkpoint image(s)")]
    Damaged(usize),
}

/// Output format of the reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens an existing home, recovering from `checkpoint` when given.
pub fn open_existing(path: &Path, checkpoint: Option<&str>) -> Result<Database, CliError> {
    let mut config = DatabaseConfig::new().create_if_missing(false);
    if let Some(name) = checkpoint {
        config = config.recover_from(name);
    }
    let db = Database::open_with_config(path, config)?;
    if db.checkpoints().is_empty() {
        return Err(CliError::Usage(format!(
            "no database found at {}",
            path.display()
        )));
    }
    Ok(db)
}
