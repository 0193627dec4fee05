//! Inspect command implementation.

use super::{open_existing, CliError, OutputFormat};
use rangedb_core::{CheckpointInfo, CursorConfig, Database, QueryTimestamp, Timestamp};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Oldest timestamp after recovery.
    pub oldest: Timestamp,
    /// Stable timestamp after recovery.
    pub stable: Timestamp,
    /// Live tables and indexes.
    pub tables: Vec<TableSummary>,
    /// Prepared transactions waiting for a coordinator.
    pub unclaimed_prepared: usize,
    /// Checkpoint details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoints: Option<Vec<CheckpointInfo>>,
}

/// Summary of one table.
#[derive(Debug, Serialize)]
pub struct TableSummary {
    /// Table URI.
    pub uri: String,
    /// Storage layout and formats.
    pub format: String,
    /// Records visible to an untimestamped reader.
    pub records: usize,
}

fn count_records(db: &Database, uri: &str) -> Result<usize, CliError> {
    let session = db.open_session();
    let mut cursor = session.open_cursor(uri, CursorConfig::new())?;
    let mut records = 0;
    loop {
        match cursor.next() {
            Ok(()) => records += 1,
            Err(e) if e.is_not_found() => return Ok(records),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Builds the inspection result.
pub fn inspect(db: &Database, path: &Path, show_checkpoints: bool) -> Result<InspectResult, CliError> {
    let mut tables = Vec::new();
    for uri in db.tables() {
        tables.push(TableSummary {
            format: format!("{:?}", db.table_format(&uri)?),
            records: count_records(db, &uri)?,
            uri,
        });
    }
    Ok(InspectResult {
        path: path.display().to_string(),
        oldest: db.query_timestamp(QueryTimestamp::Oldest),
        stable: db.query_timestamp(QueryTimestamp::Stable),
        tables,
        unclaimed_prepared: db.unclaimed_prepared().len(),
        checkpoints: show_checkpoints.then(|| db.checkpoints()),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, show_checkpoints: bool, format: OutputFormat) -> Result<(), CliError> {
    let db = open_existing(path, None)?;
    let result = inspect(&db, path, show_checkpoints)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("RangeDB Database Inspection");
    println!("===========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Timestamps:");
    println!("  Oldest: {}", result.oldest);
    println!("  Stable: {}", result.stable);
    println!();
    println!("Tables:");
    for table in &result.tables {
        println!("  {} ({} records) {}", table.uri, table.records, table.format);
    }
    if result.unclaimed_prepared > 0 {
        println!();
        println!("Unclaimed prepared transactions: {}", result.unclaimed_prepared);
    }

    if let Some(checkpoints) = &result.checkpoints {
        println!();
        println!("Checkpoints:");
        for ckpt in checkpoints {
            println!(
                "  [{}] {} stable={} oldest={} prepared={}",
                ckpt.sequence, ckpt.name, ckpt.stable, ckpt.oldest, ckpt.prepared
            );
            for (uri, records) in &ckpt.tables {
                println!("      {uri}: {records} records");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangedb_core::CheckpointConfig;
    use tempfile::tempdir;

    #[test]
    fn inspect_reports_tables_and_checkpoints() {
        let home = tempdir().unwrap();
        {
            let db = Database::open(home.path()).unwrap();
            let session = db.open_session();
            session
                .create("table:t", "key_format=q,value_format=S".parse().unwrap())
                .unwrap();
            let mut cursor = session.open_cursor("table:t", CursorConfig::new()).unwrap();
            for k in 1..=3i64 {
                cursor.set_key(k);
                cursor.set_value("v");
                cursor.insert().unwrap();
            }
            drop(cursor);
            session.checkpoint(&CheckpointConfig::new()).unwrap();
        }

        let db = open_existing(home.path(), None).unwrap();
        let result = inspect(&db, home.path(), true).unwrap();
        assert_eq!(result.tables.len(), 1);
        assert_eq!(result.tables[0].records, 3);
        assert_eq!(result.checkpoints.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn missing_home_is_an_error() {
        let home = tempdir().unwrap();
        assert!(open_existing(&home.path().join("absent"), None).is_err());
    }
}
