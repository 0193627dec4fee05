//! Verify command implementation.

use super::CliError;
use rangedb_core::checkpoint::{decode, verify};
use rangedb_core::DatabaseDir;
use std::path::Path;

/// Verification result for one checkpoint image.
#[derive(Debug)]
pub struct ImageReport {
    /// Checkpoint name.
    pub name: String,
    /// Encoded size in bytes.
    pub size: usize,
    /// Sequence number from the header, when readable.
    pub sequence: Option<u64>,
    /// Records across all tables, when the body decoded.
    pub records: Option<usize>,
    /// What was wrong with the image.
    pub error: Option<String>,
}

impl ImageReport {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Checks every image in the home, or only `only` when given.
pub fn verify_home(path: &Path, only: Option<&str>) -> Result<Vec<ImageReport>, CliError> {
    let dir = DatabaseDir::open(path, false)?;
    let mut reports = Vec::new();
    for name in dir.list_checkpoints()? {
        if only.is_some_and(|o| o != name) {
            continue;
        }
        let data = dir.load_checkpoint(&name)?;
        let mut report = ImageReport {
            name,
            size: data.len(),
            sequence: None,
            records: None,
            error: None,
        };
        match verify(&data).and_then(|header| {
            report.sequence = Some(header.sequence);
            decode(&data)
        }) {
            Ok(image) => {
                report.records = Some(image.tables.iter().map(|t| t.record_count()).sum());
            }
            Err(e) => report.error = Some(e.to_string()),
        }
        reports.push(report);
    }
    if let Some(name) = only {
        if reports.is_empty() {
            return Err(CliError::Usage(format!("no checkpoint named {name}")));
        }
    }
    Ok(reports)
}

/// Runs the verify command.
pub fn run(path: &Path, only: Option<&str>) -> Result<(), CliError> {
    println!("Verifying database at {}", path.display());
    println!();

    let reports = verify_home(path, only)?;
    for report in &reports {
        print_report(report);
    }
    let damaged = reports.iter().filter(|r| !r.is_ok()).count();

    println!();
    if damaged == 0 {
        println!("✓ {} checkpoint image(s) verified", reports.len());
        Ok(())
    } else {
        println!("✗ {damaged} of {} checkpoint image(s) damaged", reports.len());
        Err(CliError::Damaged(damaged))
    }
}

fn print_report(report: &ImageReport) {
    match &report.error {
        None => println!(
            "  {}: OK ({} bytes, sequence {}, {} records)",
            report.name,
            report.size,
            report.sequence.unwrap_or_default(),
            report.records.unwrap_or_default()
        ),
        Some(error) => println!("  {}: CORRUPT ({} bytes): {error}", report.name, report.size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangedb_core::{CheckpointConfig, Database};
    use tempfile::tempdir;

    #[test]
    fn damaged_images_are_reported() {
        let home = tempdir().unwrap();
        {
            let db = Database::open(home.path()).unwrap();
            let session = db.open_session();
            session
                .create("table:t", "key_format=q,value_format=S".parse().unwrap())
                .unwrap();
            session.checkpoint(&CheckpointConfig::new().name("good")).unwrap();
            session.checkpoint(&CheckpointConfig::new().name("bad")).unwrap();
        }
        let bad = home.path().join("bad.ckpt");
        let mut data = std::fs::read(&bad).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0x01;
        std::fs::write(&bad, data).unwrap();

        let reports = verify_home(home.path(), None).unwrap();
        assert_eq!(reports.len(), 2);
        let bad = reports.iter().find(|r| r.name == "bad").unwrap();
        assert!(bad.error.is_some());
        let good = reports.iter().find(|r| r.name == "good").unwrap();
        assert!(good.is_ok());
        assert_eq!(good.records, Some(0));

        assert!(matches!(run(home.path(), None), Err(CliError::Damaged(1))));
        assert!(verify_home(home.path(), Some("missing")).is_err());
    }
}
