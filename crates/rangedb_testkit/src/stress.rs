//! Stress workloads for RangeDB.
//!
//! Each workload runs against a shared [`Database`] and classifies every
//! operation as committed, conflicted (the engine asked for a rollback or
//! hit a prepared update) or failed. Every thread works through its own
//! [`Session`].

use crate::fixtures::{create_table, drain, TABLE};
use rangedb_core::{
    BeginConfig, BoundConfig, CheckpointConfig, CommitConfig, CoreError, CoreResult, CursorConfig,
    Database, RollbackConfig, Session,
};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Outcome of one workload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressTestResult {
    /// Operations that completed.
    pub committed: usize,
    /// Operations refused with a rollback-required or prepare conflict.
    pub conflicts: usize,
    /// Operations that failed for any other reason.
    pub errors: usize,
    /// Wall-clock time of the workload.
    pub elapsed: Duration,
}

impl StressTestResult {
    /// Every attempted operation.
    #[must_use]
    pub fn operations(&self) -> usize {
        self.committed + self.conflicts + self.errors
    }

    /// Attempted operations per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.operations() as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for StressTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ops in {:?} ({:.0}/s): {} committed, {} conflicts, {} errors",
            self.operations(),
            self.elapsed,
            self.throughput(),
            self.committed,
            self.conflicts,
            self.errors
        )
    }
}

/// Counters shared by the threads of one workload.
#[derive(Debug, Default)]
struct Tally {
    committed: AtomicUsize,
    conflicts: AtomicUsize,
    errors: AtomicUsize,
}

impl Tally {
    fn record(&self, result: CoreResult<()>) {
        let counter = match result {
            Ok(()) => &self.committed,
            Err(e) if e.requires_rollback() || e.is_retryable() => &self.conflicts,
            Err(_) => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, started: Instant) -> StressTestResult {
        StressTestResult {
            committed: self.committed.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        }
    }
}

/// Workload shape.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations across all threads.
    pub operations: usize,
    /// Writer threads (concurrent workloads only).
    pub threads: usize,
    /// Length of each stored value.
    pub value_size: usize,
    /// Keys are drawn from `0..key_count`.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            value_size: 256,
            key_count: 1_000,
        }
    }
}

impl StressConfig {
    fn value(&self) -> String {
        "x".repeat(self.value_size)
    }

    fn key(&self, i: usize) -> i64 {
        as_key(i % self.key_count.max(1))
    }

    fn per_thread(&self) -> usize {
        self.operations / self.threads.max(1)
    }
}

fn as_key(i: usize) -> i64 {
    i64::try_from(i).unwrap_or(i64::MAX)
}

/// Creates `table:test` with integer keys and string values if missing.
pub fn prepare_table(db: &Database) {
    if !db.tables().iter().any(|t| t == TABLE) {
        create_table(db, TABLE, "key_format=q,value_format=S");
    }
}

fn put(session: &Session, key: i64, value: &str) -> CoreResult<()> {
    let mut cursor = session.open_cursor(TABLE, CursorConfig::new())?;
    cursor.set_key(key);
    cursor.set_value(value);
    cursor.insert()
}

fn in_transaction(session: &Session, f: impl FnOnce() -> CoreResult<()>) -> CoreResult<()> {
    session.begin_transaction(&BeginConfig::new())?;
    match f() {
        Ok(()) => session.commit_transaction(&CommitConfig::new()),
        Err(e) => {
            session.rollback_transaction(&RollbackConfig::new())?;
            Err(e)
        }
    }
}

fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(panic) = handle.join() {
            std::panic::resume_unwind(panic);
        }
    }
}

fn populate_keys(db: &Database, config: &StressConfig) {
    prepare_table(db);
    let session = db.open_session();
    let value = config.value();
    for i in 0..config.key_count {
        let _ = put(&session, config.key(i), &value);
    }
}

/// One-key transactions from a single session.
pub fn stress_sequential_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    prepare_table(db);
    let session = db.open_session();
    let value = config.value();

    let tally = Tally::default();
    let started = Instant::now();
    for i in 0..config.operations {
        tally.record(in_transaction(&session, || put(&session, config.key(i), &value)));
    }
    tally.finish(started)
}

/// Each operation scans a window of ten keys through a bounded cursor.
pub fn stress_bounded_scans(db: &Database, config: &StressConfig) -> StressTestResult {
    populate_keys(db, config);
    let session = db.open_session();

    let scan = |lower: i64| -> CoreResult<()> {
        let mut cursor = session.open_cursor(TABLE, CursorConfig::new())?;
        cursor.set_key(lower);
        cursor.bound(BoundConfig::lower())?;
        cursor.set_key(lower + 9);
        cursor.bound(BoundConfig::upper())?;
        drain(&mut cursor, true).map(|_| ())
    };

    let tally = Tally::default();
    let started = Instant::now();
    for i in 0..config.operations {
        tally.record(scan(config.key(i)));
    }
    tally.finish(started)
}

/// Autocommit inserts, point reads and removes in rotation.
pub fn stress_mixed_operations(db: &Database, config: &StressConfig) -> StressTestResult {
    prepare_table(db);
    let session = db.open_session();
    let value = config.value();

    let tally = Tally::default();
    let started = Instant::now();
    for i in 0..config.operations {
        let key = config.key(i);
        let result = match i % 3 {
            0 => put(&session, key, &value),
            // a miss is still a successful read
            1 => match crate::fixtures::read(&session, TABLE, key) {
                Err(e) if !e.is_not_found() => Err(e),
                _ => Ok(()),
            },
            _ => session
                .open_cursor(TABLE, CursorConfig::new())
                .and_then(|mut cursor| {
                    cursor.set_key(key);
                    cursor.remove()
                }),
        };
        tally.record(result);
    }
    tally.finish(started)
}

/// Concurrent writers; thread `t` owns keys `t, t + threads, ...` so no
/// two writers touch the same key.
pub fn stress_concurrent_writers(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    prepare_table(&db);
    let tally = Arc::new(Tally::default());
    let per_thread = config.per_thread();
    let threads = config.threads.max(1);

    let started = Instant::now();
    let handles = (0..threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let tally = Arc::clone(&tally);
            let value = config.value();
            thread::spawn(move || {
                let session = db.open_session();
                for i in 0..per_thread {
                    let key = as_key(i * threads + t);
                    tally.record(in_transaction(&session, || put(&session, key, &value)));
                }
            })
        })
        .collect();
    join_all(handles);
    tally.finish(started)
}

/// Writers on overlapping keys racing a thread that range-truncates and
/// checkpoints. Truncates and writers conflict with each other, and each
/// conflicted transaction is rolled back.
pub fn stress_truncate_and_checkpoint(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    populate_keys(&db, config);
    let tally = Arc::new(Tally::default());
    let per_thread = config.per_thread();
    let key_count = config.key_count.max(1);

    let started = Instant::now();
    let mut handles: Vec<_> = (0..config.threads.max(1))
        .map(|t| {
            let db = Arc::clone(&db);
            let tally = Arc::clone(&tally);
            let value = config.value();
            thread::spawn(move || {
                let session = db.open_session();
                for i in 0..per_thread {
                    let key = as_key((t * per_thread + i) % key_count);
                    tally.record(in_transaction(&session, || put(&session, key, &value)));
                }
            })
        })
        .collect();

    let truncator = {
        let db = Arc::clone(&db);
        let tally = Arc::clone(&tally);
        let rounds = per_thread / 10;
        thread::spawn(move || {
            let session = db.open_session();
            for round in 0..rounds {
                let lower = as_key(round * 7 % key_count);
                let truncated = in_transaction(&session, || {
                    let mut start = session.open_cursor(TABLE, CursorConfig::new())?;
                    let mut stop = session.open_cursor(TABLE, CursorConfig::new())?;
                    start.set_key(lower);
                    stop.set_key(lower + 5);
                    session.truncate(None, Some(&start), Some(&stop))
                });
                tally.record(truncated.and_then(|()| {
                    let name = format!("round{}", round % 3);
                    session.checkpoint(&CheckpointConfig::new().name(name)).map(|_| ())
                }));
            }
        })
    };
    handles.push(truncator);
    join_all(handles);
    tally.finish(started)
}

/// Every other transaction is rolled back on purpose and counted as a
/// conflict.
pub fn stress_transaction_rollbacks(db: &Database, config: &StressConfig) -> StressTestResult {
    prepare_table(db);
    let session = db.open_session();
    let value = config.value();

    let tally = Tally::default();
    let started = Instant::now();
    for i in 0..config.operations {
        let result = session.begin_transaction(&BeginConfig::new()).and_then(|()| {
            put(&session, config.key(i), &value)?;
            if i % 2 == 0 {
                session.rollback_transaction(&RollbackConfig::new())?;
                Err(CoreError::rollback_required("abandoned by the workload"))
            } else {
                session.commit_transaction(&CommitConfig::new())
            }
        });
        tally.record(result);
    }
    tally.finish(started)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(db: &Database) -> usize {
        let session = db.open_session();
        let mut cursor = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
        drain(&mut cursor, true).unwrap().len()
    }

    fn small(operations: usize, key_count: usize) -> StressConfig {
        StressConfig {
            operations,
            key_count,
            value_size: 32,
            ..StressConfig::default()
        }
    }

    #[test]
    fn sequential_writes_overwrite_the_key_space() {
        let db = Database::open_in_memory().unwrap();
        let result = stress_sequential_writes(&db, &small(1_000, 100));
        assert_eq!(result.committed, 1_000);
        assert_eq!(result.operations(), 1_000);
        assert_eq!(count(&db), 100);
    }

    #[test]
    fn bounded_scans_exit_early() {
        let db = Database::open_in_memory().unwrap();
        let result = stress_bounded_scans(&db, &small(500, 200));
        assert_eq!(result.errors, 0);
        assert!(db.stats().bounds_next_early_exit > 0);
    }

    #[test]
    fn mixed_operations_never_fail() {
        let db = Database::open_in_memory().unwrap();
        let result = stress_mixed_operations(&db, &small(1_000, 100));
        assert_eq!(result.committed, 1_000);
    }

    #[test]
    fn disjoint_writers_do_not_conflict() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let result = stress_concurrent_writers(Arc::clone(&db), &small(1_000, 1_000));
        assert_eq!(result.conflicts + result.errors, 0);
        assert_eq!(count(&db), 1_000);
    }

    #[test]
    fn truncates_race_writers_and_checkpoints() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let result = stress_truncate_and_checkpoint(Arc::clone(&db), &small(800, 100));
        assert_eq!(result.operations(), 800 + 20);
        assert!(result.committed > 0);
        assert!(count(&db) <= 100);
        assert!(!db.checkpoints().is_empty() || result.committed < result.operations());
    }

    #[test]
    fn abandoned_transactions_count_as_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let result = stress_transaction_rollbacks(&db, &small(100, 1_000));
        assert_eq!(result.committed, 50);
        assert_eq!(result.conflicts, 50);
        assert_eq!(result.errors, 0);
        assert!(result.to_string().contains("50 conflicts"));
    }
}
