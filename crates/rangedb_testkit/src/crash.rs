//! Crash recovery testing for RangeDB.
//!
//! A crash is simulated by dropping a file-backed [`Database`] without a
//! final checkpoint and reopening its home. Everything after the newest
//! checkpoint must be gone and everything in it must be back.
//!
//! ## Test Strategy
//!
//! 1. **Crash after checkpoint** - checkpointed records survive
//! 2. **Crash before checkpoint** - later records are discarded
//! 3. **Crash during truncate** - an uncommitted truncate is not recovered
//! 4. **Crash during checkpoint write** - a leftover temporary image is ignored
//! 5. **Damaged image** - opening fails instead of recovering bad data
//! 6. **Crash with a prepared transaction** - the journal decides its fate
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rangedb_testkit::crash::CrashRecoveryHarness;
//!
//! let harness = CrashRecoveryHarness::new()?;
//! assert!(harness.run_all().iter().all(|r| r.passed));
//! ```

use crate::fixtures::{create_table, drain, populate, TABLE};
use rangedb_core::{
    BeginConfig, CheckpointConfig, CoreError, CoreResult, CursorConfig, Database, DatabaseConfig,
    PrepareConfig, PreparedId, Timestamp, CHECKPOINT_EXTENSION, DEFAULT_CHECKPOINT_NAME,
};
use rangedb_storage::{FileBackend, StorageBackend};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Points at which a crash is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// After a checkpoint completed.
    AfterCheckpoint,
    /// After writes that no checkpoint captured.
    BeforeCheckpoint,
    /// While a truncate was still uncommitted.
    DuringTruncate,
    /// While a checkpoint image was half written.
    DuringCheckpointWrite,
    /// With a prepared transaction in the checkpoint journal.
    WhilePrepared,
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Where the crash happened.
    pub point: Option<CrashPoint>,
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected records after recovery.
    pub expected_records: usize,
    /// Actual records after recovery.
    pub actual_records: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    fn check(point: Option<CrashPoint>, description: &str, expected: usize, actual: usize) -> Self {
        Self {
            point,
            passed: expected == actual,
            description: description.to_string(),
            expected_records: expected,
            actual_records: actual,
            error: (expected != actual)
                .then(|| format!("expected {expected} records, recovered {actual}")),
        }
    }

    fn error(point: Option<CrashPoint>, description: &str, error: &CoreError) -> Self {
        Self {
            point,
            passed: false,
            description: description.to_string(),
            expected_records: 0,
            actual_records: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Runs crash scenarios against homes in a temporary directory.
pub struct CrashRecoveryHarness {
    root: TempDir,
}

impl CrashRecoveryHarness {
    /// Creates a harness with a fresh temporary directory.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            root: TempDir::new()?,
        })
    }

    fn home(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Opens the home, creating `table:test` when it is new.
    fn open(home: &Path, config: DatabaseConfig) -> CoreResult<Database> {
        let db = Database::open_with_config(home, config)?;
        if db.tables().is_empty() {
            create_table(&db, TABLE, "key_format=q,value_format=S");
        }
        Ok(db)
    }

    fn count(db: &Database) -> CoreResult<usize> {
        let session = db.open_session();
        let mut cursor = session.open_cursor(TABLE, CursorConfig::new())?;
        Ok(drain(&mut cursor, true)?.len())
    }

    fn run(
        &self,
        point: CrashPoint,
        description: &str,
        expected: usize,
        crash: impl FnOnce(&Database) -> CoreResult<()>,
    ) -> CrashRecoveryResult {
        let home = self.home(&format!("{point:?}"));
        let outcome = (|| {
            {
                let db = Self::open(&home, DatabaseConfig::new())?;
                crash(&db)?;
            }
            Self::count(&Self::open(&home, DatabaseConfig::new())?)
        })();
        match outcome {
            Ok(actual) => CrashRecoveryResult::check(Some(point), description, expected, actual),
            Err(e) => CrashRecoveryResult::error(Some(point), description, &e),
        }
    }

    /// Records checkpointed before the crash are recovered.
    pub fn test_crash_after_checkpoint(&self) -> CrashRecoveryResult {
        self.run(
            CrashPoint::AfterCheckpoint,
            "checkpointed records survive a crash",
            50,
            |db| {
                let session = db.open_session();
                populate(&session, TABLE, (1..=50i64).map(|k| (k, "v")), None)?;
                session.checkpoint(&CheckpointConfig::new())?;
                Ok(())
            },
        )
    }

    /// Records written after the last checkpoint are lost.
    pub fn test_crash_before_checkpoint(&self) -> CrashRecoveryResult {
        self.run(
            CrashPoint::BeforeCheckpoint,
            "records after the last checkpoint are discarded",
            20,
            |db| {
                let session = db.open_session();
                populate(&session, TABLE, (1..=20i64).map(|k| (k, "v")), None)?;
                session.checkpoint(&CheckpointConfig::new())?;
                populate(&session, TABLE, (21..=40i64).map(|k| (k, "v")), None)?;
                Ok(())
            },
        )
    }

    /// A truncate that had not committed when a checkpoint ran stays undone.
    pub fn test_crash_during_truncate(&self) -> CrashRecoveryResult {
        self.run(
            CrashPoint::DuringTruncate,
            "uncommitted truncates are not recovered",
            30,
            |db| {
                let session = db.open_session();
                populate(&session, TABLE, (1..=30i64).map(|k| (k, "v")), None)?;
                session.begin_transaction(&BeginConfig::new())?;
                session.truncate(Some(TABLE), None, None)?;
                db.open_session().checkpoint(&CheckpointConfig::new())?;
                Ok(())
            },
        )
    }

    /// A torn temporary image left by a crash mid-write is ignored.
    pub fn test_crash_during_checkpoint_write(&self) -> CrashRecoveryResult {
        self.run(
            CrashPoint::DuringCheckpointWrite,
            "a half-written checkpoint image is ignored",
            10,
            |db| {
                let session = db.open_session();
                populate(&session, TABLE, (1..=10i64).map(|k| (k, "v")), None)?;
                session.checkpoint(&CheckpointConfig::new())?;
                let Some(home) = db.path() else {
                    return Err(CoreError::invalid_argument("crash tests need a home"));
                };
                let image = std::fs::read(
                    home.join(format!("{DEFAULT_CHECKPOINT_NAME}.{CHECKPOINT_EXTENSION}")),
                )?;
                let torn = home.join(format!("{DEFAULT_CHECKPOINT_NAME}.{CHECKPOINT_EXTENSION}.tmp"));
                let mut backend = FileBackend::open(&torn)?;
                backend.replace(&image[..image.len() / 2])?;
                backend.sync()?;
                Ok(())
            },
        )
    }

    /// Opening a home whose image was damaged fails.
    pub fn test_damaged_checkpoint(&self) -> CrashRecoveryResult {
        let description = "a damaged checkpoint image is rejected";
        let home = self.home("damaged");
        let damage = || -> CoreResult<()> {
            let db = Self::open(&home, DatabaseConfig::new())?;
            let session = db.open_session();
            populate(&session, TABLE, (1..=10i64).map(|k| (k, "v")), None)?;
            session.checkpoint(&CheckpointConfig::new())?;
            drop(session);
            drop(db);

            let path = home.join(format!("{DEFAULT_CHECKPOINT_NAME}.{CHECKPOINT_EXTENSION}"));
            let mut backend = FileBackend::open(&path)?;
            let mut image = backend.read_all()?;
            if let Some(last) = image.last_mut() {
                *last ^= 0xFF;
            }
            backend.replace(&image)?;
            backend.sync()?;
            Ok(())
        };
        if let Err(e) = damage() {
            return CrashRecoveryResult::error(None, description, &e);
        }
        match Database::open(&home) {
            Err(CoreError::CorruptCheckpoint { .. }) => {
                CrashRecoveryResult::check(None, description, 0, 0)
            }
            Err(e) => CrashRecoveryResult::error(None, description, &e),
            Ok(_) => CrashRecoveryResult {
                point: None,
                passed: false,
                description: description.to_string(),
                expected_records: 0,
                actual_records: 0,
                error: Some("damaged image was accepted".to_string()),
            },
        }
    }

    /// A prepared transaction in the journal is rolled back on reopen, or
    /// left for a coordinator to claim when `preserve_prepared` is set.
    pub fn test_crash_while_prepared(&self, preserve_prepared: bool) -> CrashRecoveryResult {
        let description = if preserve_prepared {
            "a journaled prepared transaction can be claimed after a crash"
        } else {
            "a journaled prepared transaction is rolled back after a crash"
        };
        let home = self.home(&format!("prepared-{preserve_prepared}"));
        let config = DatabaseConfig::new().preserve_prepared(preserve_prepared);
        let outcome = (|| {
            {
                let db = Self::open(&home, config.clone())?;
                let session = db.open_session();
                populate(&session, TABLE, [(1i64, "before")], None)?;
                session.begin_transaction(&BeginConfig::new())?;
                populate(&session, TABLE, [(2i64, "prepared")], None)?;
                session.prepare_transaction(
                    &PrepareConfig::at(Timestamp::new(5)).prepared_id(PreparedId::new(1)),
                )?;
                db.open_session().checkpoint(&CheckpointConfig::new())?;
            }
            let db = Self::open(&home, config.clone())?;
            let pending = db.unclaimed_prepared().len();
            let records = if preserve_prepared { pending } else { Self::count(&db)? };
            Ok::<_, CoreError>(records)
        })();
        match outcome {
            Ok(actual) => CrashRecoveryResult::check(Some(CrashPoint::WhilePrepared), description, 1, actual),
            Err(e) => CrashRecoveryResult::error(Some(CrashPoint::WhilePrepared), description, &e),
        }
    }

    /// Runs every scenario.
    pub fn run_all(&self) -> Vec<CrashRecoveryResult> {
        vec![
            self.test_crash_after_checkpoint(),
            self.test_crash_before_checkpoint(),
            self.test_crash_during_truncate(),
            self.test_crash_during_checkpoint_write(),
            self.test_damaged_checkpoint(),
            self.test_crash_while_prepared(false),
            self.test_crash_while_prepared(true),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_passed(result: &CrashRecoveryResult) {
        assert!(result.passed, "{}: {:?}", result.description, result.error);
    }

    #[test]
    fn crash_after_checkpoint() {
        assert_passed(&CrashRecoveryHarness::new().unwrap().test_crash_after_checkpoint());
    }

    #[test]
    fn crash_before_checkpoint() {
        assert_passed(&CrashRecoveryHarness::new().unwrap().test_crash_before_checkpoint());
    }

    #[test]
    fn crash_during_truncate() {
        assert_passed(&CrashRecoveryHarness::new().unwrap().test_crash_during_truncate());
    }

    #[test]
    fn crash_during_checkpoint_write() {
        assert_passed(&CrashRecoveryHarness::new().unwrap().test_crash_during_checkpoint_write());
    }

    #[test]
    fn damaged_checkpoint() {
        assert_passed(&CrashRecoveryHarness::new().unwrap().test_damaged_checkpoint());
    }

    #[test]
    fn crash_while_prepared() {
        let harness = CrashRecoveryHarness::new().unwrap();
        assert_passed(&harness.test_crash_while_prepared(false));
        assert_passed(&harness.test_crash_while_prepared(true));
    }

    #[test]
    fn run_all_uses_separate_homes() {
        let harness = CrashRecoveryHarness::new().unwrap();
        let results = harness.run_all();
        assert_eq!(results.len(), 7);
        for result in &results {
            assert_passed(result);
        }
    }
}
