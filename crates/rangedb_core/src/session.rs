//! Sessions: the unit of transactional work.
//!
//! A session runs at most one explicit transaction at a time. Operations
//! outside a transaction run as autocommit operations: reads see the latest
//! committed data and each write is wrapped in its own implicit transaction
//! that commits without a timestamp.
//!
//! A session is owned by one thread; share the [`crate::Database`] and open
//! one session per thread.

use crate::checkpoint::CheckpointInfo;
use crate::config::{
    BeginConfig, CheckpointConfig, CommitConfig, CursorConfig, DropConfig, PrepareConfig,
    RollbackConfig, SessionConfig, TableConfig, TxnTimestampConfig,
};
use crate::cursor::Cursor;
use crate::database::Engine;
use crate::error::{CoreError, CoreResult};
use crate::schema::{Key, Value};
use crate::store::{ReadView, Table, WriteOp};
use crate::truncate::{truncate, TruncateRange};
use crate::txn::{Snapshot, Transaction, TxnState, TxnWrites};
use crate::types::{Timestamp, TxnId};
use std::cell::{Cell, RefCell};
use std::sync::Arc;

/// A single-threaded handle for transactions, cursors and schema changes.
pub struct Session {
    engine: Arc<Engine>,
    config: Cell<SessionConfig>,
    txn: RefCell<Option<Transaction>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config.get())
            .field("transaction", &self.transaction_id())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(engine: Arc<Engine>, config: SessionConfig) -> Self {
        Self {
            engine,
            config: Cell::new(config),
            txn: RefCell::new(None),
        }
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Changes the session defaults; applies to transactions begun later.
    pub fn reconfigure(&self, config: SessionConfig) -> CoreResult<()> {
        if self.in_transaction() {
            return Err(CoreError::invalid_argument(
                "cannot reconfigure a session with a running transaction",
            ));
        }
        self.config.set(config);
        Ok(())
    }

    // --- transactions ------------------------------------------------------

    /// Begins a transaction.
    ///
    /// Settings left unset in `config` come from the session defaults.
    pub fn begin_transaction(&self, config: &BeginConfig) -> CoreResult<()> {
        if self.in_transaction() {
            return Err(CoreError::invalid_argument("a transaction is already running"));
        }
        let defaults = self.config.get();
        let mut effective = config.clone();
        effective.isolation = Some(config.isolation.unwrap_or(defaults.isolation));
        effective.ignore_prepare = config.ignore_prepare || defaults.ignore_prepare;
        let txn = self.engine.txns.begin(&effective)?;
        *self.txn.borrow_mut() = Some(txn);
        Ok(())
    }

    /// Commits the running transaction.
    ///
    /// A timestamp error leaves the transaction running so the caller can
    /// retry or roll back. A transaction poisoned by a conflict is rolled
    /// back and [`CoreError::RollbackRequired`] returned.
    pub fn commit_transaction(&self, config: &CommitConfig) -> CoreResult<()> {
        self.finish(|engine, txn| engine.txns.commit(txn, config))
    }

    /// Rolls the running transaction back.
    pub fn rollback_transaction(&self, config: &RollbackConfig) -> CoreResult<()> {
        self.finish(|engine, txn| engine.txns.rollback(txn, config))
    }

    fn finish(
        &self,
        f: impl FnOnce(&Engine, &mut Transaction) -> CoreResult<()>,
    ) -> CoreResult<()> {
        let mut slot = self.txn.borrow_mut();
        let txn = slot
            .as_mut()
            .ok_or_else(|| CoreError::invalid_argument("no transaction is running"))?;
        let result = f(&self.engine, txn);
        if matches!(txn.state(), TxnState::Committed | TxnState::RolledBack) {
            *slot = None;
        }
        result
    }

    /// Prepares the running transaction for a two-phase commit.
    pub fn prepare_transaction(&self, config: &PrepareConfig) -> CoreResult<()> {
        let mut slot = self.txn.borrow_mut();
        let txn = slot
            .as_mut()
            .ok_or_else(|| CoreError::invalid_argument("no transaction is running"))?;
        self.engine.txns.prepare(txn, config)
    }

    /// Sets timestamps on the running transaction.
    pub fn timestamp_transaction(&self, config: &TxnTimestampConfig) -> CoreResult<()> {
        let mut slot = self.txn.borrow_mut();
        let txn = slot
            .as_mut()
            .ok_or_else(|| CoreError::invalid_argument("no transaction is running"))?;
        self.engine.txns.timestamp_transaction(txn, config)
    }

    /// Whether an explicit transaction is running (or prepared).
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.txn.borrow().is_some()
    }

    /// Id of the running transaction.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TxnId> {
        self.txn.borrow().as_ref().map(Transaction::id)
    }

    /// State of the running transaction.
    #[must_use]
    pub fn transaction_state(&self) -> Option<TxnState> {
        self.txn.borrow().as_ref().map(Transaction::state)
    }

    /// The read timestamp of the running transaction.
    #[must_use]
    pub fn read_timestamp(&self) -> Option<Timestamp> {
        self.txn
            .borrow()
            .as_ref()
            .map(Transaction::read_timestamp)
            .filter(|ts| !ts.is_none())
    }

    // --- schema ------------------------------------------------------------

    /// Creates a table.
    pub fn create(&self, uri: &str, config: TableConfig) -> CoreResult<()> {
        self.engine.catalog.create(uri, config).map(drop)
    }

    /// Creates a secondary index `index:<table>:<name>` over value columns.
    pub fn create_index(&self, uri: &str, columns: &[usize]) -> CoreResult<()> {
        self.engine.catalog.create_index(uri, columns).map(drop)
    }

    /// Drops a table with its indexes, or one index.
    pub fn drop(&self, uri: &str, config: &DropConfig) -> CoreResult<()> {
        self.engine.catalog.drop(uri, config)
    }

    // --- data --------------------------------------------------------------

    /// Opens a cursor on a table, an index, or a table of a checkpoint.
    pub fn open_cursor(&self, uri: &str, config: CursorConfig) -> CoreResult<Cursor<'_>> {
        match &config.checkpoint {
            Some(name) => {
                let (table, stable) = self.engine.checkpoints.table(name, uri)?;
                let view = ReadView {
                    txn: TxnId::NONE,
                    snapshot: Snapshot::all(),
                    read_ts: config.checkpoint_read_timestamp.unwrap_or(stable),
                    ignore_prepare: true,
                };
                Cursor::new(self, table, config, Some(view))
            }
            None => {
                let table = self.engine.catalog.get(uri)?;
                Cursor::new(self, table, config, None)
            }
        }
    }

    /// Removes records in a range.
    ///
    /// With `uri` alone the whole table is truncated. Otherwise the range
    /// runs from `start`'s key to `stop`'s key, either end open when its
    /// cursor is missing, and clipped by the bounds of the cursors given.
    pub fn truncate(
        &self,
        uri: Option<&str>,
        start: Option<&Cursor<'_>>,
        stop: Option<&Cursor<'_>>,
    ) -> CoreResult<()> {
        let range = match uri {
            Some(_) if start.is_some() || stop.is_some() => {
                return Err(CoreError::invalid_argument(
                    "truncate takes either a URI or cursors, not both",
                ))
            }
            Some(uri) => {
                let table = self.engine.catalog.get(uri)?;
                if table.index_def().is_some() {
                    return Err(CoreError::invalid_argument(format!(
                        "{uri} is an index; truncate its table instead"
                    )));
                }
                TruncateRange::whole(table)
            }
            None => TruncateRange::between(start, stop)?,
        };
        let stats = &self.engine.stats;
        self.in_write_txn(|view, writes| truncate(&range, view, writes, stats))
    }

    /// Takes a checkpoint.
    pub fn checkpoint(&self, config: &CheckpointConfig) -> CoreResult<CheckpointInfo> {
        if self.in_transaction() {
            return Err(CoreError::invalid_argument(
                "checkpoint is not permitted in a running transaction",
            ));
        }
        self.engine.checkpoint(config)
    }

    // --- plumbing for cursors ----------------------------------------------

    /// The view the next read uses.
    pub(crate) fn read_view(&self) -> CoreResult<ReadView> {
        let mut slot = self.txn.borrow_mut();
        match slot.as_mut() {
            Some(txn) => {
                txn.ensure_readable()?;
                self.engine.txns.refresh(txn);
                Ok(txn.view())
            }
            // Reads under the tree lock, so seeing every committed version
            // is the same as a snapshot taken now.
            None => Ok(ReadView {
                txn: TxnId::NONE,
                snapshot: Snapshot::all(),
                read_ts: Timestamp::NONE,
                ignore_prepare: self.config.get().ignore_prepare,
            }),
        }
    }

    /// Writes one record in the running transaction, or autocommits it.
    pub(crate) fn write(
        &self,
        table: &Arc<Table>,
        key: Key,
        op: WriteOp,
        overwrite: bool,
    ) -> CoreResult<Option<Option<Value>>> {
        self.in_write_txn(|view, writes| table.write(view, key, op, overwrite, writes))
    }

    fn in_write_txn<T>(
        &self,
        f: impl FnOnce(&ReadView, &mut TxnWrites) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let txns = &self.engine.txns;
        let mut slot = self.txn.borrow_mut();
        if let Some(txn) = slot.as_mut() {
            txn.ensure_writable()?;
            txns.refresh(txn);
            let view = txn.view();
            let result = f(&view, &mut txn.writes);
            if let Err(err) = &result {
                if err.requires_rollback() {
                    self.engine.stats.record_rollback_required();
                    txn.mark_rollback_only(err.to_string());
                }
            }
            return result;
        }
        drop(slot);

        let mut txn = txns.begin_implicit();
        let view = txn.view();
        match f(&view, &mut txn.writes) {
            Ok(value) => {
                txns.commit(&mut txn, &CommitConfig::new())?;
                Ok(value)
            }
            Err(err) => {
                if err.requires_rollback() {
                    self.engine.stats.record_rollback_required();
                }
                txns.abort(&mut txn);
                Err(err)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut txn) = self.txn.get_mut().take() {
            tracing::debug!(txn = %txn.id(), "session closed with a running transaction");
            self.engine.txns.abort(&mut txn);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{
        BeginConfig, CheckpointConfig, CommitConfig, CursorConfig, PrepareConfig, SessionConfig,
        TimestampConfig, TxnTimestampConfig,
    };
    use crate::error::{CoreError, CoreResult};
    use crate::schema::Value;
    use crate::types::Timestamp;
    use crate::{Database, Session, TxnState};

    fn ts(t: u64) -> Timestamp {
        Timestamp::new(t)
    }

    fn database() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.open_session()
            .create("table:t", "key_format=q,value_format=S".parse().unwrap())
            .unwrap();
        db
    }

    fn write_at(session: &Session, key: i64, value: &str, commit: Option<u64>) {
        session.begin_transaction(&BeginConfig::new()).unwrap();
        {
            let mut cursor = session.open_cursor("table:t", CursorConfig::new()).unwrap();
            cursor.set_key(key);
            cursor.set_value(value);
            cursor.insert().unwrap();
        }
        let config = commit.map_or_else(CommitConfig::new, |t| CommitConfig::new().commit_timestamp(ts(t)));
        session.commit_transaction(&config).unwrap();
    }

    fn read(session: &Session, key: i64) -> CoreResult<Value> {
        let mut cursor = session.open_cursor("table:t", CursorConfig::new())?;
        cursor.set_key(key);
        cursor.search()?;
        cursor.value()
    }

    fn read_at(db: &Database, key: i64, at: u64) -> CoreResult<Value> {
        let session = db.open_session();
        session.begin_transaction(&BeginConfig::new().read_timestamp(ts(at)))?;
        read(&session, key)
    }

    #[test]
    fn readers_see_the_newest_version_at_their_timestamp() {
        let db = database();
        let session = db.open_session();
        write_at(&session, 1, "ten", Some(10));
        write_at(&session, 1, "twenty", Some(20));

        assert!(read_at(&db, 1, 5).unwrap_err().is_not_found());
        assert_eq!(read_at(&db, 1, 15).unwrap(), Value::str("ten"));
        assert_eq!(read_at(&db, 1, 20).unwrap(), Value::str("twenty"));
        assert_eq!(read(&session, 1).unwrap(), Value::str("twenty"));
    }

    #[test]
    fn snapshot_hides_transactions_committed_later() {
        let db = database();
        let reader = db.open_session();
        reader.begin_transaction(&BeginConfig::new()).unwrap();
        let writer = db.open_session();
        write_at(&writer, 1, "late", None);
        assert!(read(&reader, 1).unwrap_err().is_not_found());
        reader.commit_transaction(&CommitConfig::new()).unwrap();
        assert_eq!(read(&reader, 1).unwrap(), Value::str("late"));
    }

    #[test]
    fn untimestamped_commits_are_visible_at_every_read_timestamp() {
        let db = database();
        let session = db.open_session();
        write_at(&session, 1, "stamped", Some(50));
        session
            .begin_transaction(&BeginConfig::new().no_timestamp(true))
            .unwrap();
        {
            let mut cursor = session.open_cursor("table:t", CursorConfig::new()).unwrap();
            cursor.set_key(1i64);
            cursor.set_value("plain");
            cursor.update().unwrap();
        }
        session
            .commit_transaction(&CommitConfig::new().commit_timestamp(ts(60)))
            .unwrap();
        assert_eq!(read_at(&db, 1, 1).unwrap(), Value::str("plain"));
        assert_eq!(read_at(&db, 1, 55).unwrap(), Value::str("plain"));
    }

    #[test]
    fn timestamp_errors_leave_the_transaction_running() {
        let db = database();
        db.set_timestamp(&TimestampConfig::new().stable(ts(10))).unwrap();
        let session = db.open_session();
        session.begin_transaction(&BeginConfig::new()).unwrap();
        let stale = session.commit_transaction(&CommitConfig::new().commit_timestamp(ts(10)));
        assert!(matches!(stale, Err(CoreError::InvalidArgument { .. })));
        assert_eq!(session.transaction_state(), Some(TxnState::Running));

        let durable = session.timestamp_transaction(&TxnTimestampConfig::new().durable_timestamp(ts(30)));
        assert!(durable.is_err());
        session
            .timestamp_transaction(&TxnTimestampConfig::new().commit_timestamp(ts(11)))
            .unwrap();
        session.commit_transaction(&CommitConfig::new()).unwrap();
        assert!(!session.in_transaction());
    }

    #[test]
    fn clocks_never_retreat() {
        let db = database();
        db.set_timestamp(&TimestampConfig::new().oldest(ts(5)).stable(ts(10)))
            .unwrap();
        assert!(db.set_timestamp(&TimestampConfig::new().stable(ts(9))).is_err());
        assert!(db.set_timestamp(&TimestampConfig::new().oldest(ts(4))).is_err());
        assert!(db.set_timestamp(&TimestampConfig::new().oldest(ts(11))).is_err());
        assert_eq!(db.query_timestamp(crate::QueryTimestamp::Stable), ts(10));

        let session = db.open_session();
        let old_reader = session.begin_transaction(&BeginConfig::new().read_timestamp(ts(3)));
        assert!(old_reader.is_err());
        assert!(!session.in_transaction());
    }

    #[test]
    fn session_rules() {
        let db = database();
        let session = db.open_session();
        session.begin_transaction(&BeginConfig::new()).unwrap();
        assert!(session.begin_transaction(&BeginConfig::new()).is_err());
        assert!(session.reconfigure(SessionConfig::new()).is_err());
        assert!(session.checkpoint(&CheckpointConfig::new()).is_err());
        session
            .prepare_transaction(&PrepareConfig::at(ts(5)))
            .unwrap();
        assert!(read(&session, 1).is_err());
        assert!(session.commit_transaction(&CommitConfig::new()).is_err());
        session
            .commit_transaction(&CommitConfig::new().commit_timestamp(ts(6)))
            .unwrap();
        assert!(session.commit_transaction(&CommitConfig::new()).is_err());
    }

    #[test]
    fn ignore_prepare_transactions_are_read_only() {
        let db = database();
        let session = db.open_session_with_config(SessionConfig::new().ignore_prepare(true));
        session.begin_transaction(&BeginConfig::new()).unwrap();
        let mut cursor = session.open_cursor("table:t", CursorConfig::new()).unwrap();
        cursor.set_key(1i64);
        cursor.set_value("x");
        assert!(matches!(cursor.insert(), Err(CoreError::InvalidArgument { .. })));
    }

    #[test]
    fn checkpoint_cursor_reads_the_image() {
        let db = database();
        let session = db.open_session();
        write_at(&session, 1, "old", Some(10));
        db.set_timestamp(&TimestampConfig::new().stable(ts(10))).unwrap();
        write_at(&session, 1, "new", Some(20));
        session.checkpoint(&CheckpointConfig::new().name("c1")).unwrap();

        let mut cursor = session
            .open_cursor("table:t", CursorConfig::new().checkpoint("c1"))
            .unwrap();
        assert!(cursor.is_checkpoint());
        cursor.set_key(1i64);
        cursor.search().unwrap();
        assert_eq!(cursor.value().unwrap(), Value::str("old"));
        cursor.set_key(1i64);
        cursor.set_value("write");
        assert!(matches!(cursor.update(), Err(CoreError::NotSupported { .. })));

        let missing = session.open_cursor("table:t", CursorConfig::new().checkpoint("nope"));
        assert!(matches!(missing, Err(CoreError::InvalidArgument { .. })));
    }
}
