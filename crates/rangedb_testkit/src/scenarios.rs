//! End-to-end scenarios with literal values.
//!
//! Each scenario builds its own in-memory database, runs the operations and
//! returns what it observed so tests and benches can check it.

use crate::fixtures::{create_table, drain, int_keys, populate, set_bound, TestDatabase, TABLE};
use rangedb_core::{
    BeginConfig, BoundConfig, CheckpointConfig, CommitConfig, CoreError, CoreResult,
    CursorConfig, Key, Position, PrepareConfig, RollbackConfig, Timestamp, TimestampConfig,
    Value,
};
use std::cmp::Ordering;

fn ts(value: u64) -> Timestamp {
    Timestamp::new(value)
}

/// Three-letter name of `i`, counting `aaa`, `aab`, ... in base 26.
pub fn letter_key(i: usize) -> String {
    let digits = [i / 676 % 26, i / 26 % 26, i % 26];
    digits
        .iter()
        .map(|&d| char::from(b'a' + u8::try_from(d).unwrap_or(0)))
        .collect()
}

/// Bounded forward scan over keys `1..=1000` with `[45, 50]`.
pub fn bounded_scan() -> CoreResult<Vec<i64>> {
    let db = crate::fixtures::presets::populated_database(1000);
    let session = db.open_session();
    let mut cursor = session.open_cursor(TABLE, CursorConfig::new())?;
    set_bound(&mut cursor, 45i64, BoundConfig::lower())?;
    set_bound(&mut cursor, 50i64, BoundConfig::upper())?;
    cursor.reset();
    Ok(int_keys(&drain(&mut cursor, true)?))
}

/// Outcome of [`exclusive_fixed_column_upper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedScan {
    /// Record numbers returned by a full forward scan.
    pub recnos: Vec<u64>,
    /// Whether searching for the largest record number was not-found.
    pub max_not_found: bool,
}

/// Exclusive upper bound at the largest record of a fixed-length column store.
pub fn exclusive_fixed_column_upper() -> CoreResult<FixedScan> {
    let db = TestDatabase::memory();
    create_table(&db, "table:fixed", "key_format=r,value_format=8t");
    let session = db.open_session();
    populate(
        &session,
        "table:fixed",
        (1..=100u8).map(|n| (Key::recno(u64::from(n)), Value::Bits(n))),
        None,
    )?;

    let mut cursor = session.open_cursor("table:fixed", CursorConfig::new())?;
    set_bound(&mut cursor, Key::recno(100), BoundConfig::upper().inclusive(false))?;
    cursor.reset();
    let recnos = drain(&mut cursor, true)?
        .iter()
        .filter_map(|(k, _)| k.as_recno())
        .collect();
    cursor.set_key(Key::recno(100));
    let max_not_found = cursor.search().is_err_and(|e| e.is_not_found());
    Ok(FixedScan {
        recnos,
        max_not_found,
    })
}

/// `search_near` past the upper bound of a fixed-width string table.
///
/// Keys are [`letter_key`] of `0..1000`, bounded to `["aac", "aaz")`.
pub fn search_near_outside_bounds() -> CoreResult<(Ordering, Key)> {
    let db = TestDatabase::memory();
    create_table(&db, TABLE, "key_format=5s,value_format=S");
    let session = db.open_session();
    populate(
        &session,
        TABLE,
        (1000..2000).map(|i| (letter_key(i - 1000), format!("value{i}"))),
        None,
    )?;

    let mut cursor = session.open_cursor(TABLE, CursorConfig::new())?;
    set_bound(&mut cursor, "aac", BoundConfig::lower())?;
    set_bound(&mut cursor, "aaz", BoundConfig::upper().inclusive(false))?;
    cursor.set_key("ab");
    let exact = cursor.search_near()?;
    Ok((exact, cursor.key()?))
}

/// Outcome of [`truncate_rollback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateRollback {
    /// Records a full scan counts after the rollback.
    pub count: usize,
    /// Keys in `[200, 800]` whose value is not `v1` after the rollback.
    pub changed: Vec<i64>,
    /// Records the truncating transaction itself saw before rolling back.
    pub count_inside: usize,
}

/// Truncates `[200, 800]` of keys `1..=1000` in a transaction and rolls back.
pub fn truncate_rollback() -> CoreResult<TruncateRollback> {
    let db = crate::fixtures::presets::populated_database(1000);
    let session = db.open_session();

    session.begin_transaction(&BeginConfig::new())?;
    let count_inside = {
        let mut start = session.open_cursor(TABLE, CursorConfig::new())?;
        let mut stop = session.open_cursor(TABLE, CursorConfig::new())?;
        start.set_key(200i64);
        stop.set_key(800i64);
        session.truncate(None, Some(&start), Some(&stop))?;
        let mut scan = session.open_cursor(TABLE, CursorConfig::new())?;
        drain(&mut scan, true)?.len()
    };
    session.rollback_transaction(&RollbackConfig::new())?;

    let mut changed = Vec::new();
    for k in 200..=800i64 {
        if crate::fixtures::read(&session, TABLE, k)? != Value::str("v1") {
            changed.push(k);
        }
    }
    let mut scan = session.open_cursor(TABLE, CursorConfig::new())?;
    Ok(TruncateRollback {
        count: drain(&mut scan, true)?.len(),
        changed,
        count_inside,
    })
}

/// Outcome of [`prepare_conflict_scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareConflictScan {
    /// Consecutive `next` calls that failed with a prepare conflict.
    pub conflicts: usize,
    /// Whether the cursor stayed unpositioned through the conflicts.
    pub stayed_unset: bool,
    /// The record `next` returned once the prepared transaction committed.
    pub after_commit: (Key, Value),
}

/// A bounded scan that runs into a prepared insert until it commits.
pub fn prepare_conflict_scan() -> CoreResult<PrepareConflictScan> {
    let db = TestDatabase::memory();
    create_table(&db, TABLE, "key_format=q,value_format=S");

    let writer = db.open_session();
    writer.begin_transaction(&BeginConfig::new())?;
    populate(&writer, TABLE, [(1i64, "V")], None)?;
    writer.prepare_transaction(&PrepareConfig::at(ts(5)))?;

    let reader = db.open_session();
    let mut cursor = reader.open_cursor(TABLE, CursorConfig::new())?;
    set_bound(&mut cursor, 1i64, BoundConfig::lower())?;
    let mut conflicts = 0;
    let mut stayed_unset = true;
    for _ in 0..3 {
        match cursor.next() {
            Err(CoreError::PrepareConflict) => conflicts += 1,
            Err(e) => return Err(e),
            Ok(()) => break,
        }
        stayed_unset &= cursor.position() == &Position::Unset;
    }

    writer.commit_transaction(&CommitConfig::new().commit_timestamp(ts(6)))?;
    cursor.next()?;
    Ok(PrepareConflictScan {
        conflicts,
        stayed_unset,
        after_commit: (cursor.key()?, cursor.value()?),
    })
}

/// Keys the prepared-commit scenarios write.
pub const PREPARED_KEYS: std::ops::RangeInclusive<i64> = 1..=10;

/// Runs the prepare-then-commit-across-stable sequence on `db`:
/// `v1` at 10, stable 10, `v2` prepared at 20, stable 30, committed at 25
/// with durable 35.
///
/// A checkpoint named `before` is taken after stable reaches 10.
pub fn commit_prepared_across_stable(db: &rangedb_core::Database) -> CoreResult<()> {
    let session = db.open_session();
    populate(&session, TABLE, PREPARED_KEYS.map(|k| (k, "v1")), Some(ts(10)))?;
    db.set_timestamp(&TimestampConfig::new().stable(ts(10)))?;
    session.checkpoint(&CheckpointConfig::new().name("before"))?;

    session.begin_transaction(&BeginConfig::new())?;
    populate(&session, TABLE, PREPARED_KEYS.map(|k| (k, "v2")), None)?;
    session.prepare_transaction(&PrepareConfig::at(ts(20)))?;
    db.set_timestamp(&TimestampConfig::new().stable(ts(30)))?;
    session.commit_transaction(
        &CommitConfig::new()
            .commit_timestamp(ts(25))
            .durable_timestamp(ts(35)),
    )?;
    Ok(())
}

/// Checkpoints after [`commit_prepared_across_stable`] and reads every key
/// from that checkpoint at read timestamp 25.
pub fn prepared_commit_in_checkpoint() -> CoreResult<Vec<Value>> {
    let db = TestDatabase::memory();
    create_table(&db, TABLE, "key_format=q,value_format=S");
    commit_prepared_across_stable(&db)?;

    let session = db.open_session();
    session.checkpoint(&CheckpointConfig::new())?;
    let mut cursor = session.open_cursor(
        TABLE,
        CursorConfig::new()
            .checkpoint(rangedb_core::DEFAULT_CHECKPOINT_NAME)
            .checkpoint_read_timestamp(ts(25)),
    )?;
    Ok(drain(&mut cursor, true)?
        .into_iter()
        .map(|(_, v)| v)
        .collect())
}
