//! Invariants checked over generated inputs.
//!
//! The checkers return a description of the first violation, so proptest
//! cases and ordinary tests can share them.

use crate::fixtures::{drain, int_keys, int_table, set_bound, TestDatabase, TABLE};
use crate::generators::{CursorStep, GenBounds};
use rangedb_core::{
    BeginConfig, BoundConfig, CommitConfig, CoreError, CoreResult, Cursor, CursorConfig,
    DatabaseConfig, Key, RollbackConfig, Timestamp,
};
use std::collections::BTreeSet;

/// Installs generated bounds on a cursor.
pub fn install_bounds(cursor: &mut Cursor<'_>, bounds: &GenBounds) -> CoreResult<()> {
    if let Some(lower) = bounds.lower {
        set_bound(cursor, lower.key, BoundConfig::lower().inclusive(lower.inclusive))?;
    }
    if let Some(upper) = bounds.upper {
        set_bound(cursor, upper.key, BoundConfig::upper().inclusive(upper.inclusive))?;
    }
    Ok(())
}

fn current_int(cursor: &Cursor<'_>) -> CoreResult<i64> {
    match cursor.key()? {
        Key::Int(k) => Ok(k),
        other => Err(CoreError::invalid_argument(format!("unexpected key {other}"))),
    }
}

/// Runs `steps` on a bounded cursor over `keys` and checks that every key
/// returned lies inside the bounds and exists in the table.
pub fn check_bounded_steps(
    keys: &BTreeSet<i64>,
    bounds: &GenBounds,
    steps: &[CursorStep],
) -> Result<(), String> {
    let db = TestDatabase::memory();
    int_table(&db, keys.iter().copied(), "v");
    let session = db.open_session();
    let mut cursor = session
        .open_cursor(TABLE, CursorConfig::new())
        .map_err(|e| e.to_string())?;
    install_bounds(&mut cursor, bounds).map_err(|e| e.to_string())?;
    cursor.reset();

    let expected: Vec<i64> = keys.iter().copied().filter(|k| bounds.admits(*k)).collect();
    let scanned = drain(&mut cursor, true).map_err(|e| e.to_string())?;
    if int_keys(&scanned) != expected {
        return Err(format!("forward scan {:?}, expected {expected:?}", int_keys(&scanned)));
    }
    cursor.reset();

    for step in steps {
        let result = match *step {
            CursorStep::Next => cursor.next(),
            CursorStep::Prev => cursor.prev(),
            CursorStep::Reset => {
                cursor.reset();
                continue;
            }
            CursorStep::Search(k) => {
                cursor.set_key(k);
                cursor.search()
            }
            CursorStep::SearchNear(k) => {
                cursor.set_key(k);
                cursor.search_near().map(|_| ())
            }
        };
        match result {
            Ok(()) => {
                let k = current_int(&cursor).map_err(|e| e.to_string())?;
                if !bounds.admits(k) || !keys.contains(&k) {
                    return Err(format!("{step:?} returned {k} outside {bounds:?}"));
                }
                if let CursorStep::Search(target) = *step {
                    if k != target {
                        return Err(format!("search for {target} landed on {k}"));
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                if let CursorStep::Search(target) = *step {
                    if bounds.admits(target) && keys.contains(&target) {
                        return Err(format!("search for {target} was not found"));
                    }
                }
                if let CursorStep::SearchNear(_) = *step {
                    if !expected.is_empty() {
                        return Err("search_near found nothing in a non-empty range".into());
                    }
                }
            }
            Err(e) => return Err(format!("{step:?} failed: {e}")),
        }
    }
    Ok(())
}

/// Commits `history` for key 1 (each entry a commit timestamp and whether
/// it removes the key) and checks every read timestamp sees the newest
/// version at or below it.
pub fn check_history_visibility(history: &[(u64, bool)]) -> Result<(), String> {
    let db = TestDatabase::memory();
    int_table(&db, [], "unused");
    let session = db.open_session();
    let run = |r: CoreResult<()>| r.map_err(|e| e.to_string());

    let mut present = false;
    let mut committed = Vec::new();
    for &(commit, removed) in history {
        let removed = removed && present;
        run(session.begin_transaction(&BeginConfig::new()))?;
        {
            let mut cursor = session
                .open_cursor(TABLE, CursorConfig::new())
                .map_err(|e| e.to_string())?;
            cursor.set_key(1i64);
            if removed {
                run(cursor.remove())?;
            } else {
                cursor.set_value(format!("v{commit}"));
                run(cursor.insert())?;
            }
        }
        run(session.commit_transaction(
            &CommitConfig::new().commit_timestamp(Timestamp::new(commit)),
        ))?;
        present = !removed;
        committed.push((commit, removed));
    }

    let last = committed.last().map_or(0, |(ts, _)| *ts);
    for read_ts in 1..=last + 2 {
        let expected = committed
            .iter()
            .rev()
            .find(|(ts, _)| *ts <= read_ts)
            .and_then(|(ts, removed)| (!removed).then(|| format!("v{ts}")));

        run(session.begin_transaction(
            &BeginConfig::new().read_timestamp(Timestamp::new(read_ts)),
        ))?;
        let seen = match crate::fixtures::read(&session, TABLE, 1i64) {
            Ok(value) => value.as_str().map(str::to_string),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.to_string()),
        };
        run(session.rollback_transaction(&RollbackConfig::new()))?;
        if seen != expected {
            return Err(format!("read at {read_ts} saw {seen:?}, expected {expected:?}"));
        }
    }
    Ok(())
}

/// Truncates `[lo, hi]` of keys `1..=count` in a transaction, rolls back and
/// checks every key is back.
pub fn check_truncate_rollback(count: i64, lo: i64, hi: i64) -> Result<(), String> {
    let db = TestDatabase::memory_with_config(DatabaseConfig::new().leaf_page_max_entries(4));
    int_table(&db, 1..=count, "v1");
    let session = db.open_session();

    let truncate = || -> CoreResult<usize> {
        session.begin_transaction(&BeginConfig::new())?;
        let mut start = session.open_cursor(TABLE, CursorConfig::new())?;
        let mut stop = session.open_cursor(TABLE, CursorConfig::new())?;
        start.set_key(lo);
        stop.set_key(hi);
        session.truncate(None, Some(&start), Some(&stop))?;
        let mut scan = session.open_cursor(TABLE, CursorConfig::new())?;
        let inside = drain(&mut scan, true)?.len();
        drop((start, stop, scan));
        session.rollback_transaction(&RollbackConfig::new())?;
        Ok(inside)
    };
    let inside = truncate().map_err(|e| e.to_string())?;
    let removed = usize::try_from(hi.min(count) - lo.max(1) + 1).unwrap_or(0);
    if inside != usize::try_from(count).unwrap_or(0) - removed {
        return Err(format!("truncate of [{lo}, {hi}] left {inside} records"));
    }

    let mut scan = session
        .open_cursor(TABLE, CursorConfig::new())
        .map_err(|e| e.to_string())?;
    let after = drain(&mut scan, true).map_err(|e| e.to_string())?;
    if int_keys(&after) != (1..=count).collect::<Vec<_>>() {
        return Err(format!("rollback of [{lo}, {hi}] did not restore every key"));
    }
    if after.iter().any(|(_, v)| v.as_str() != Some("v1")) {
        return Err(format!("rollback of [{lo}, {hi}] changed a value"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{create_table, populate, read, with_temp_db};
    use crate::generators::{bounds_strategy, cursor_steps_strategy, history_strategy, key_set_strategy};
    use crate::scenarios::{commit_prepared_across_stable, PREPARED_KEYS};
    use proptest::prelude::*;
    use rangedb_core::{
        CheckpointConfig, Database, PrepareConfig, SessionConfig, TimestampConfig, Value,
    };

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn bounded_cursors_stay_in_bounds(
            keys in key_set_strategy(40, 30),
            bounds in bounds_strategy(40),
            steps in cursor_steps_strategy(40, 40),
        ) {
            prop_assert_eq!(check_bounded_steps(&keys, &bounds, &steps), Ok(()));
        }

        #[test]
        fn readers_see_the_newest_version_at_or_below_their_timestamp(
            history in history_strategy(8),
        ) {
            prop_assert_eq!(check_history_visibility(&history), Ok(()));
        }

        #[test]
        fn truncate_rollback_restores_any_interval(lo in 1i64..40, len in 0i64..20) {
            prop_assert_eq!(check_truncate_rollback(40, lo, lo + len), Ok(()));
        }
    }

    #[test]
    fn insert_search_remove_round_trip() {
        with_temp_db(|db| {
            int_table(db, [1, 5, 9], "v");
            let session = db.open_session();
            let mut cursor = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
            set_bound(&mut cursor, 3i64, BoundConfig::lower()).unwrap();
            set_bound(&mut cursor, 7i64, BoundConfig::upper()).unwrap();

            cursor.set_key(6i64);
            cursor.set_value("six");
            cursor.insert().unwrap();
            cursor.set_key(6i64);
            cursor.search().unwrap();
            assert_eq!(cursor.value().unwrap(), Value::str("six"));

            cursor.set_key(6i64);
            cursor.remove().unwrap();
            cursor.set_key(6i64);
            assert!(cursor.search().unwrap_err().is_not_found());
        });
    }

    #[test]
    fn fixed_column_removal_reads_zero() {
        with_temp_db(|db| {
            create_table(db, "table:fixed", "key_format=r,value_format=8t");
            let session = db.open_session();
            populate(&session, "table:fixed", [(Key::recno(1), Value::Bits(7)), (Key::recno(2), Value::Bits(9))], None)
                .unwrap();
            let mut cursor = session.open_cursor("table:fixed", CursorConfig::new()).unwrap();
            cursor.set_key(Key::recno(1));
            cursor.remove().unwrap();
            cursor.set_key(Key::recno(1));
            cursor.search().unwrap();
            assert_eq!(cursor.value().unwrap(), Value::Bits(0));
        });
    }

    #[test]
    fn clear_reset_and_truncate_are_idempotent() {
        with_temp_db(|db| {
            int_table(db, 1..=20, "v");
            let session = db.open_session();
            let mut cursor = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
            set_bound(&mut cursor, 5i64, BoundConfig::lower()).unwrap();
            cursor.bound(BoundConfig::clear()).unwrap();
            let once = cursor.bounds().clone();
            cursor.bound(BoundConfig::clear()).unwrap();
            assert_eq!(cursor.bounds(), &once);

            cursor.next().unwrap();
            cursor.reset();
            let position = cursor.position().clone();
            cursor.reset();
            assert_eq!(cursor.position(), &position);
            drop(cursor);

            for _ in 0..2 {
                let mut start = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
                let mut stop = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
                start.set_key(5i64);
                stop.set_key(10i64);
                session.truncate(None, Some(&start), Some(&stop)).unwrap();
            }
            let mut scan = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
            assert_eq!(drain(&mut scan, true).unwrap().len(), 14);
        });
    }

    #[test]
    fn clocks_are_monotone() {
        with_temp_db(|db| {
            let ts = Timestamp::new;
            db.set_timestamp(&TimestampConfig::new().oldest(ts(10)).stable(ts(20))).unwrap();
            let past_stable = db.set_timestamp(&TimestampConfig::new().oldest(ts(30)));
            assert!(matches!(past_stable, Err(CoreError::InvalidArgument { .. })));
            let stable_back = db.set_timestamp(&TimestampConfig::new().stable(ts(15)));
            assert!(matches!(stable_back, Err(CoreError::InvalidArgument { .. })));
            let oldest_back = db.set_timestamp(&TimestampConfig::new().oldest(ts(5)));
            assert!(matches!(oldest_back, Err(CoreError::InvalidArgument { .. })));
        });
    }

    #[test]
    fn prepared_keys_conflict_unless_ignored() {
        with_temp_db(|db| {
            int_table(db, [1, 2], "before");
            let writer = db.open_session();
            writer.begin_transaction(&BeginConfig::new()).unwrap();
            populate(&writer, TABLE, [(1i64, "after")], None).unwrap();
            writer.prepare_transaction(&PrepareConfig::at(Timestamp::new(5))).unwrap();

            let plain = db.open_session();
            assert!(matches!(read(&plain, TABLE, 1i64), Err(CoreError::PrepareConflict)));
            assert_eq!(read(&plain, TABLE, 2i64).unwrap(), Value::str("before"));

            let ignoring = db.open_session_with_config(SessionConfig::new().ignore_prepare(true));
            assert_eq!(read(&ignoring, TABLE, 1i64).unwrap(), Value::str("before"));
        });
    }

    fn read_all(db: &Database) -> Vec<Value> {
        let session = db.open_session();
        let mut cursor = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
        drain(&mut cursor, true).unwrap().into_iter().map(|(_, v)| v).collect()
    }

    #[test]
    fn restart_keeps_prepared_commits_past_stable() {
        let mut db = TestDatabase::memory();
        create_table(&db, TABLE, "key_format=q,value_format=S");
        commit_prepared_across_stable(&db).unwrap();
        db.open_session().checkpoint(&CheckpointConfig::new().name("after")).unwrap();

        db.restart(Some("after")).unwrap();
        let values = read_all(&db);
        assert_eq!(values.len(), PREPARED_KEYS.count());
        assert!(values.iter().all(|v| *v == Value::str("v2")));

        db.restart(Some("before")).unwrap();
        db.rollback_to_stable().unwrap();
        assert!(read_all(&db).iter().all(|v| *v == Value::str("v1")));
    }

    #[test]
    fn rollback_to_stable_drops_prepared_commits_durable_past_stable() {
        let db = TestDatabase::memory();
        create_table(&db, TABLE, "key_format=q,value_format=S");
        commit_prepared_across_stable(&db).unwrap();
        db.rollback_to_stable().unwrap();
        assert!(read_all(&db).iter().all(|v| *v == Value::str("v1")));
    }
}
