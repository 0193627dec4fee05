//! Rollback-to-stable command implementation.
//!
//! Recovers a checkpoint, removes every version that is not durable at its
//! stable timestamp and writes the result back as a new checkpoint.

use super::{open_existing, CliError};
use rangedb_core::{CheckpointConfig, Database, QueryTimestamp, DEFAULT_CHECKPOINT_NAME};
use std::path::Path;

/// Outcome of a rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// Checkpoint the database was recovered from.
    pub source: String,
    /// Checkpoint the result was written to, unless this was a dry run.
    pub target: Option<String>,
    /// Versions and page deletes removed.
    pub removed: usize,
}

/// Rolls `db` back to its stable timestamp and checkpoints the result as
/// `target` unless `dry_run` is set.
pub fn rollback(
    db: &Database,
    source: &str,
    target: &str,
    dry_run: bool,
) -> Result<RollbackOutcome, CliError> {
    let removed = db.rollback_to_stable()?;
    tracing::info!(
        stable = %db.query_timestamp(QueryTimestamp::Stable),
        removed,
        "rolled back to stable"
    );
    let target = if dry_run {
        None
    } else {
        db.checkpoint(&CheckpointConfig::new().name(target))?;
        Some(target.to_string())
    };
    Ok(RollbackOutcome {
        source: source.to_string(),
        target,
        removed,
    })
}

/// Runs the rollback command.
pub fn run(
    path: &Path,
    checkpoint: Option<&str>,
    target: Option<&str>,
    dry_run: bool,
) -> Result<(), CliError> {
    let db = open_existing(path, checkpoint)?;
    let source = match checkpoint {
        Some(name) => name.to_string(),
        None => db
            .checkpoints()
            .into_iter()
            .max_by_key(|c| c.sequence)
            .map_or_else(|| DEFAULT_CHECKPOINT_NAME.to_string(), |c| c.name),
    };
    let target = target.unwrap_or(&source).to_string();
    let outcome = rollback(&db, &source, &target, dry_run)?;

    println!("Recovered from checkpoint {}", outcome.source);
    println!("Removed {} unstable versions", outcome.removed);
    match outcome.target {
        Some(target) => println!("Wrote checkpoint {target}"),
        None => println!("Dry run: nothing written"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangedb_core::{
        BeginConfig, CommitConfig, CursorConfig, PrepareConfig, Timestamp, TimestampConfig,
    };
    use tempfile::tempdir;

    fn ts(value: u64) -> Timestamp {
        Timestamp::new(value)
    }

    #[test]
    fn rollback_drops_commits_durable_after_stable() {
        let home = tempdir().unwrap();
        {
            let db = Database::open(home.path()).unwrap();
            let session = db.open_session();
            session
                .create("table:t", "key_format=q,value_format=S".parse().unwrap())
                .unwrap();
            db.set_timestamp(&TimestampConfig::new().stable(ts(10))).unwrap();
            session.begin_transaction(&BeginConfig::new()).unwrap();
            let mut cursor = session.open_cursor("table:t", CursorConfig::new()).unwrap();
            cursor.set_key(1i64);
            cursor.set_value("late");
            cursor.insert().unwrap();
            drop(cursor);
            session.prepare_transaction(&PrepareConfig::at(ts(20))).unwrap();
            db.set_timestamp(&TimestampConfig::new().stable(ts(30))).unwrap();
            session
                .commit_transaction(
                    &CommitConfig::new().commit_timestamp(ts(25)).durable_timestamp(ts(35)),
                )
                .unwrap();
            session.checkpoint(&CheckpointConfig::new()).unwrap();
        }

        {
            let db = open_existing(home.path(), None).unwrap();
            let dry = rollback(&db, DEFAULT_CHECKPOINT_NAME, "rolled", true).unwrap();
            assert_eq!(dry.removed, 1);
            assert_eq!(dry.target, None);
        }
        run(home.path(), None, Some("rolled"), false).unwrap();

        let db = open_existing(home.path(), Some("rolled")).unwrap();
        let session = db.open_session();
        let mut cursor = session.open_cursor("table:t", CursorConfig::new()).unwrap();
        assert!(cursor.next().unwrap_err().is_not_found());
    }
}
