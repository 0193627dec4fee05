//! Scan command implementation.
//!
//! Prints the records of one table through a bounded cursor, either from
//! live data (optionally at a read timestamp) or from a named checkpoint.

use super::{open_existing, CliError, OutputFormat};
use rangedb_core::{
    BeginConfig, BoundConfig, CursorConfig, Database, Key, RollbackConfig, TableFormat, Timestamp,
    Value,
};
use serde::Serialize;
use std::path::Path;

/// Options of the scan command.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Table or index URI.
    pub table: String,
    /// Read this checkpoint instead of live data.
    pub checkpoint: Option<String>,
    /// Lower bound key literal.
    pub lower: Option<String>,
    /// Upper bound key literal.
    pub upper: Option<String>,
    /// Exclude the lower bound key itself.
    pub lower_exclusive: bool,
    /// Exclude the upper bound key itself.
    pub upper_exclusive: bool,
    /// Read timestamp in hex.
    pub read_timestamp: Option<String>,
    /// Stop after this many records.
    pub limit: Option<usize>,
    /// Walk from the upper end.
    pub reverse: bool,
}

/// One printed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRecord {
    /// Key, formatted.
    pub key: String,
    /// Value, formatted.
    pub value: String,
}

fn parse_timestamp(text: &str) -> Result<Timestamp, CliError> {
    Timestamp::from_hex(text)
        .ok_or_else(|| CliError::Usage(format!("\"{text}\" is not a hexadecimal timestamp")))
}

fn table_format(db: &Database, options: &ScanOptions) -> Result<TableFormat, CliError> {
    match &options.checkpoint {
        Some(name) => {
            let image = db.checkpoint_image(name)?;
            let table = image.table(&options.table).ok_or_else(|| {
                CliError::Usage(format!("checkpoint {name} has no table {}", options.table))
            })?;
            Ok(table.config.format.clone())
        }
        None => Ok(db.table_format(&options.table)?),
    }
}

/// Collects the records `options` selects.
pub fn scan(db: &Database, options: &ScanOptions) -> Result<Vec<(Key, Value)>, CliError> {
    let format = table_format(db, options)?;
    let read_ts = options.read_timestamp.as_deref().map(parse_timestamp).transpose()?;
    let session = db.open_session();

    let mut config = CursorConfig::new();
    match (&options.checkpoint, read_ts) {
        (Some(name), ts) => {
            config = config.checkpoint(name.clone());
            if let Some(ts) = ts {
                config = config.checkpoint_read_timestamp(ts);
            }
        }
        (None, Some(ts)) => {
            session.begin_transaction(&BeginConfig::new().read_timestamp(ts))?;
        }
        (None, None) => {}
    }

    let mut records = Vec::new();
    {
        let mut cursor = session.open_cursor(&options.table, config)?;
        for (text, bound, exclusive) in [
            (&options.lower, BoundConfig::lower(), options.lower_exclusive),
            (&options.upper, BoundConfig::upper(), options.upper_exclusive),
        ] {
            if let Some(text) = text {
                cursor.set_key(format.parse_key(text)?);
                cursor.bound(bound.inclusive(!exclusive))?;
            }
        }
        cursor.reset();

        let limit = options.limit.unwrap_or(usize::MAX);
        while records.len() < limit {
            let step = if options.reverse { cursor.prev() } else { cursor.next() };
            match step {
                Ok(()) => records.push((cursor.key()?, cursor.value()?)),
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e.into()),
            }
        }
    }
    if session.in_transaction() {
        session.rollback_transaction(&RollbackConfig::new())?;
    }
    tracing::debug!(table = %options.table, records = records.len(), "scan finished");
    Ok(records)
}

/// Runs the scan command.
pub fn run(path: &Path, options: &ScanOptions, format: OutputFormat) -> Result<(), CliError> {
    let db = open_existing(path, None)?;
    let records: Vec<ScanRecord> = scan(&db, options)?
        .into_iter()
        .map(|(key, value)| ScanRecord {
            key: key.to_string(),
            value: value.to_string(),
        })
        .collect();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => {
            for record in &records {
                println!("{}\t{}", record.key, record.value);
            }
            println!("({} records)", records.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangedb_core::{CheckpointConfig, CommitConfig};

    fn database() -> Database {
        let db = Database::open_in_memory().unwrap();
        let session = db.open_session();
        session
            .create("table:t", "key_format=q,value_format=S".parse().unwrap())
            .unwrap();
        for (k, ts) in [(1i64, 10u64), (2, 10), (3, 20), (4, 30)] {
            session.begin_transaction(&BeginConfig::new()).unwrap();
            let mut cursor = session.open_cursor("table:t", CursorConfig::new()).unwrap();
            cursor.set_key(k);
            cursor.set_value(format!("v{k}"));
            cursor.insert().unwrap();
            drop(cursor);
            session
                .commit_transaction(&CommitConfig::new().commit_timestamp(Timestamp::new(ts)))
                .unwrap();
        }
        db
    }

    fn keys(records: &[(Key, Value)]) -> Vec<Key> {
        records.iter().map(|(k, _)| k.clone()).collect()
    }

    fn options() -> ScanOptions {
        ScanOptions {
            table: "table:t".to_string(),
            ..ScanOptions::default()
        }
    }

    #[test]
    fn bounds_and_limit_select_records() {
        let db = database();
        let bounded = ScanOptions {
            lower: Some("2".to_string()),
            upper: Some("4".to_string()),
            upper_exclusive: true,
            ..options()
        };
        assert_eq!(keys(&scan(&db, &bounded).unwrap()), vec![Key::Int(2), Key::Int(3)]);

        let reversed = ScanOptions {
            reverse: true,
            limit: Some(1),
            ..options()
        };
        assert_eq!(keys(&scan(&db, &reversed).unwrap()), vec![Key::Int(4)]);
    }

    #[test]
    fn read_timestamp_hides_later_commits() {
        let db = database();
        let at_20 = ScanOptions {
            read_timestamp: Some("14".to_string()),
            ..options()
        };
        assert_eq!(scan(&db, &at_20).unwrap().len(), 3);

        let bad = ScanOptions {
            read_timestamp: Some("zz".to_string()),
            ..options()
        };
        assert!(matches!(scan(&db, &bad), Err(CliError::Usage(_))));
    }

    #[test]
    fn checkpoint_scans_read_the_image() {
        let db = database();
        db.open_session()
            .checkpoint(&CheckpointConfig::new().name("c1"))
            .unwrap();
        let from_checkpoint = ScanOptions {
            checkpoint: Some("c1".to_string()),
            ..options()
        };
        assert_eq!(scan(&db, &from_checkpoint).unwrap().len(), 4);

        let missing = ScanOptions {
            table: "table:missing".to_string(),
            ..from_checkpoint
        };
        assert!(matches!(scan(&db, &missing), Err(CliError::Usage(_))));
    }
}
