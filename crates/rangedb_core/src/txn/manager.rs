//! Transaction manager.

use super::clock::{Clocks, GlobalClock};
use super::state::{Transaction, TxnState};
use super::Snapshot;
use crate::config::{
    BeginConfig, CommitConfig, Isolation, PrepareConfig, QueryTimestamp, RollbackConfig,
    TimestampConfig, TxnTimestampConfig,
};
use crate::error::{CoreError, CoreResult};
use crate::stats::DatabaseStats;
use crate::types::{PreparedId, Timestamp, TxnId};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A prepared transaction as seen from outside its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedRecord {
    /// Transaction id.
    pub txn: TxnId,
    /// Coordinator id.
    pub prepared_id: PreparedId,
    /// Prepare timestamp.
    pub prepare_ts: Timestamp,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    /// Oldest id the transaction's snapshot does not see.
    snapshot_horizon: TxnId,
    read_ts: Timestamp,
    commit_ts: Timestamp,
    prepared: Option<PreparedRecord>,
}

impl Registration {
    fn new(snapshot_horizon: TxnId, read_ts: Timestamp) -> Self {
        Self {
            snapshot_horizon,
            read_ts,
            commit_ts: Timestamp::NONE,
            prepared: None,
        }
    }
}

/// Hands out transaction ids and snapshots, validates timestamps and
/// resolves transactions.
///
/// Every running transaction is registered here; a snapshot is the id
/// high-water mark plus the registered set, taken under the registry lock
/// so an id is never allocated without being registered.
#[derive(Debug)]
pub struct TransactionManager {
    next_id: AtomicU64,
    running: RwLock<BTreeMap<TxnId, Registration>>,
    /// Prepared transactions restored from a checkpoint, waiting to be claimed.
    orphans: Mutex<BTreeMap<PreparedId, Transaction>>,
    clock: GlobalClock,
    max_durable: AtomicU64,
    /// Held shared while a transaction resolves; a checkpoint holds it
    /// exclusively so it never sees half-applied writes.
    gate: RwLock<()>,
    stats: Arc<DatabaseStats>,
}

impl TransactionManager {
    /// Creates a manager for a fresh database.
    pub fn new(stats: Arc<DatabaseStats>) -> Self {
        Self::with_state(1, Clocks::default(), stats)
    }

    /// Creates a manager initialized from recovery state.
    pub fn with_state(next_id: u64, clocks: Clocks, stats: Arc<DatabaseStats>) -> Self {
        Self {
            next_id: AtomicU64::new(next_id.max(1)),
            running: RwLock::new(BTreeMap::new()),
            orphans: Mutex::new(BTreeMap::new()),
            clock: GlobalClock::new(clocks),
            max_durable: AtomicU64::new(clocks.stable.as_u64()),
            gate: RwLock::new(()),
            stats,
        }
    }

    /// The global clocks.
    #[must_use]
    pub fn clock(&self) -> &GlobalClock {
        &self.clock
    }

    /// Blocks transactions from preparing, committing or rolling back until
    /// the guard is dropped. Acquire before any table lock.
    pub(crate) fn freeze(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }

    /// The id the next transaction will get.
    #[must_use]
    pub fn next_id(&self) -> TxnId {
        TxnId::new(self.next_id.load(Ordering::SeqCst))
    }

    fn register(&self, read_ts: Timestamp) -> (TxnId, Snapshot) {
        let mut running = self.running.write();
        let id = TxnId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let snapshot = Snapshot::new(id, running.keys().copied().collect());
        running.insert(id, Registration::new(snapshot.horizon(), read_ts));
        (id, snapshot)
    }

    /// A snapshot of what has finished right now, as seen by `own`.
    #[must_use]
    pub fn current_snapshot(&self, own: TxnId) -> Snapshot {
        let running = self.running.read();
        let max = self.next_id();
        let concurrent = running.keys().copied().filter(|id| *id != own).collect();
        Snapshot::new(max, concurrent)
    }

    fn check_read_timestamp(&self, ts: Timestamp) -> CoreResult<()> {
        if ts.is_none() {
            return Err(CoreError::invalid_argument("read timestamp must not be zero"));
        }
        let oldest = self.clock.get().oldest;
        if !oldest.is_none() && ts < oldest {
            return Err(CoreError::invalid_argument(format!(
                "read timestamp {ts} is older than the oldest timestamp {oldest}"
            )));
        }
        Ok(())
    }

    /// Begins a transaction, or claims a prepared one left by recovery.
    pub fn begin(&self, config: &BeginConfig) -> CoreResult<Transaction> {
        if let Some(prepared_id) = config.claim_prepared_id {
            let txn = self.orphans.lock().remove(&prepared_id).ok_or_else(|| {
                CoreError::invalid_argument(format!("no recovered transaction with {prepared_id}"))
            })?;
            tracing::debug!(txn = %txn.id(), %prepared_id, "claimed recovered prepared transaction");
            return Ok(txn);
        }
        if let Some(ts) = config.read_timestamp {
            self.check_read_timestamp(ts)?;
        }
        let (id, snapshot) = self.register(config.read_timestamp.unwrap_or(Timestamp::NONE));
        self.stats.record_transaction_begin();
        tracing::debug!(txn = %id, read_ts = ?config.read_timestamp, "begin transaction");
        Ok(Transaction::new(id, snapshot, config))
    }

    /// Begins the transaction wrapping one autocommit operation.
    pub fn begin_implicit(&self) -> Transaction {
        let (id, snapshot) = self.register(Timestamp::NONE);
        Transaction::implicit(id, snapshot)
    }

    /// Refreshes the snapshot of a read-committed transaction.
    pub fn refresh(&self, txn: &mut Transaction) {
        if txn.isolation() == Isolation::ReadCommitted && txn.state() == TxnState::Running {
            txn.set_snapshot(self.current_snapshot(txn.id()));
        }
    }

    fn check_commit_timestamp(&self, txn: &Transaction, ts: Timestamp) -> CoreResult<()> {
        if ts.is_none() {
            return Err(CoreError::invalid_argument("commit timestamp must not be zero"));
        }
        if txn.is_prepared() {
            if ts < txn.prepare_timestamp() {
                return Err(CoreError::invalid_argument(format!(
                    "commit timestamp {ts} is older than the prepare timestamp {}",
                    txn.prepare_timestamp()
                )));
            }
            return Ok(());
        }
        let first = txn.first_commit_timestamp();
        if !first.is_none() && ts < first {
            return Err(CoreError::invalid_argument(format!(
                "commit timestamp {ts} is older than the first commit timestamp {first}"
            )));
        }
        let clocks = self.clock.get();
        if !clocks.stable.is_none() && ts <= clocks.stable {
            return Err(CoreError::invalid_argument(format!(
                "commit timestamp {ts} must be newer than the stable timestamp {}",
                clocks.stable
            )));
        }
        if !clocks.oldest.is_none() && ts < clocks.oldest {
            return Err(CoreError::invalid_argument(format!(
                "commit timestamp {ts} is older than the oldest timestamp {}",
                clocks.oldest
            )));
        }
        Ok(())
    }

    fn check_durable_timestamp(&self, commit: Timestamp, durable: Timestamp) -> CoreResult<()> {
        if durable < commit {
            return Err(CoreError::invalid_argument(format!(
                "durable timestamp {durable} is older than the commit timestamp {commit}"
            )));
        }
        let stable = self.clock.get().stable;
        if !stable.is_none() && durable <= stable {
            return Err(CoreError::invalid_argument(format!(
                "durable timestamp {durable} must be newer than the stable timestamp {stable}"
            )));
        }
        Ok(())
    }

    /// Sets timestamps on a running or prepared transaction.
    pub fn timestamp_transaction(
        &self,
        txn: &mut Transaction,
        config: &TxnTimestampConfig,
    ) -> CoreResult<()> {
        if !matches!(txn.state(), TxnState::Running | TxnState::Prepared) {
            return Err(CoreError::invalid_argument("transaction is no longer running"));
        }
        if let Some(ts) = config.read_timestamp {
            if txn.is_prepared() {
                return Err(CoreError::invalid_argument(
                    "read timestamp cannot change after prepare",
                ));
            }
            self.check_read_timestamp(ts)?;
        }
        if let Some(ts) = config.commit_timestamp {
            self.check_commit_timestamp(txn, ts)?;
        }
        if config.durable_timestamp.is_some() && !txn.is_prepared() {
            return Err(CoreError::invalid_argument(
                "durable timestamp is only valid for prepared transactions",
            ));
        }

        if let Some(ts) = config.read_timestamp {
            txn.set_read_timestamp(ts);
            if let Some(reg) = self.running.write().get_mut(&txn.id()) {
                reg.read_ts = ts;
            }
        }
        if let Some(ts) = config.commit_timestamp {
            txn.set_commit_timestamp(ts);
            if let Some(reg) = self.running.write().get_mut(&txn.id()) {
                if reg.commit_ts.is_none() {
                    reg.commit_ts = ts;
                }
            }
        }
        if let Some(ts) = config.durable_timestamp {
            txn.set_durable_timestamp(ts);
        }
        Ok(())
    }

    /// Moves a running transaction into the prepared state.
    pub fn prepare(&self, txn: &mut Transaction, config: &PrepareConfig) -> CoreResult<()> {
        txn.ensure_readable()?;
        let prepare_ts = config
            .prepare_timestamp
            .ok_or_else(|| CoreError::invalid_argument("prepare timestamp is required"))?;
        if prepare_ts.is_none() {
            return Err(CoreError::invalid_argument("prepare timestamp must not be zero"));
        }
        if !txn.commit_timestamp().is_none() {
            return Err(CoreError::invalid_argument(
                "a transaction with a commit timestamp cannot prepare",
            ));
        }
        let clocks = self.clock.get();
        if !clocks.stable.is_none() && prepare_ts <= clocks.stable {
            return Err(CoreError::invalid_argument(format!(
                "prepare timestamp {prepare_ts} must be newer than the stable timestamp {}",
                clocks.stable
            )));
        }
        let prepared_id = config
            .prepared_id
            .unwrap_or(PreparedId::new(txn.id().as_u64()));

        {
            let _gate = self.gate.read();
            txn.writes.prepare(txn.id(), prepare_ts);
            if let Some(reg) = self.running.write().get_mut(&txn.id()) {
                reg.prepared = Some(PreparedRecord {
                    txn: txn.id(),
                    prepared_id,
                    prepare_ts,
                });
            }
        }
        txn.mark_prepared(prepare_ts, prepared_id);
        self.stats.record_transaction_prepare();
        tracing::debug!(txn = %txn.id(), %prepare_ts, %prepared_id, "prepared transaction");
        Ok(())
    }

    /// Commits a transaction.
    ///
    /// Timestamp errors leave the transaction running. A transaction poisoned
    /// by a conflict is rolled back and the conflict reported.
    pub fn commit(&self, txn: &mut Transaction, config: &CommitConfig) -> CoreResult<()> {
        if let Some(reason) = txn.rollback_reason().map(str::to_owned) {
            self.abort(txn);
            return Err(CoreError::rollback_required(reason));
        }
        let (commit_ts, durable_ts) = match txn.state() {
            TxnState::Prepared => {
                let commit_ts = match config.commit_timestamp {
                    Some(ts) => {
                        self.check_commit_timestamp(txn, ts)?;
                        ts
                    }
                    None => txn.commit_timestamp(),
                };
                if commit_ts.is_none() {
                    return Err(CoreError::invalid_argument(
                        "a prepared transaction needs a commit timestamp",
                    ));
                }
                let durable_ts = config
                    .durable_timestamp
                    .or(Some(txn.durable_timestamp()).filter(|ts| !ts.is_none()))
                    .unwrap_or(commit_ts);
                self.check_durable_timestamp(commit_ts, durable_ts)?;
                (commit_ts, durable_ts)
            }
            TxnState::Running => {
                if config.durable_timestamp.is_some() {
                    return Err(CoreError::invalid_argument(
                        "durable timestamp is only valid for prepared transactions",
                    ));
                }
                let commit_ts = if txn.no_timestamp() {
                    Timestamp::NONE
                } else if let Some(ts) = config.commit_timestamp {
                    self.check_commit_timestamp(txn, ts)?;
                    ts
                } else {
                    // stable may have moved since the timestamp was set
                    let ts = txn.commit_timestamp();
                    if !ts.is_none() {
                        self.check_commit_timestamp(txn, ts)?;
                    }
                    ts
                };
                (commit_ts, commit_ts)
            }
            TxnState::Committed | TxnState::RolledBack => {
                return Err(CoreError::invalid_argument("transaction is no longer running"))
            }
        };

        {
            let _gate = self.gate.read();
            txn.writes.commit(txn.id(), commit_ts, durable_ts);
            self.max_durable.fetch_max(durable_ts.as_u64(), Ordering::SeqCst);
            self.running.write().remove(&txn.id());
        }
        txn.mark_committed();
        if !txn.is_implicit() {
            self.stats.record_transaction_commit();
            tracing::debug!(txn = %txn.id(), %commit_ts, %durable_ts, "committed transaction");
        }
        Ok(())
    }

    /// Rolls a transaction back.
    pub fn rollback(&self, txn: &mut Transaction, config: &RollbackConfig) -> CoreResult<()> {
        match txn.state() {
            TxnState::Committed | TxnState::RolledBack => {
                return Err(CoreError::invalid_argument("transaction is no longer running"))
            }
            TxnState::Prepared => {
                let ts = config.rollback_timestamp.ok_or_else(|| {
                    CoreError::invalid_argument("a prepared transaction needs a rollback timestamp")
                })?;
                if ts < txn.prepare_timestamp() {
                    return Err(CoreError::invalid_argument(format!(
                        "rollback timestamp {ts} is older than the prepare timestamp {}",
                        txn.prepare_timestamp()
                    )));
                }
            }
            TxnState::Running => {}
        }
        self.abort(txn);
        Ok(())
    }

    /// Rolls back without timestamp checks; used for implicit transactions,
    /// poisoned commits and sessions closed mid-transaction.
    pub(crate) fn abort(&self, txn: &mut Transaction) {
        {
            let _gate = self.gate.read();
            txn.writes.rollback(txn.id());
            self.running.write().remove(&txn.id());
        }
        txn.mark_rolled_back();
        if !txn.is_implicit() {
            self.stats.record_transaction_rollback();
            tracing::debug!(txn = %txn.id(), "rolled back transaction");
        }
    }

    /// Registers a prepared transaction rebuilt by recovery so a session can
    /// claim it by prepared id.
    pub(crate) fn adopt_prepared(&self, txn: Transaction) {
        let prepared_id = txn
            .prepared_id()
            .unwrap_or(PreparedId::new(txn.id().as_u64()));
        let record = PreparedRecord {
            txn: txn.id(),
            prepared_id,
            prepare_ts: txn.prepare_timestamp(),
        };
        let mut registration = Registration::new(txn.id(), Timestamp::NONE);
        registration.prepared = Some(record);
        self.running.write().insert(txn.id(), registration);
        self.orphans.lock().insert(prepared_id, txn);
    }

    /// Recovered prepared transactions nobody has claimed yet.
    #[must_use]
    pub fn unclaimed_prepared(&self) -> Vec<PreparedRecord> {
        self.orphans
            .lock()
            .values()
            .filter_map(|t| {
                Some(PreparedRecord {
                    txn: t.id(),
                    prepared_id: t.prepared_id()?,
                    prepare_ts: t.prepare_timestamp(),
                })
            })
            .collect()
    }

    /// Prepared transactions currently registered.
    #[must_use]
    pub fn prepared(&self) -> Vec<PreparedRecord> {
        self.running
            .read()
            .values()
            .filter_map(|r| r.prepared)
            .collect()
    }

    /// Whether any transaction is running or prepared.
    #[must_use]
    pub fn has_running(&self) -> bool {
        !self.running.read().is_empty()
    }

    /// The oldest id some running snapshot may not see. Transactions below
    /// it are visible to every reader.
    #[must_use]
    pub fn horizon(&self) -> TxnId {
        let running = self.running.read();
        running
            .values()
            .map(|r| r.snapshot_horizon)
            .min()
            .unwrap_or_else(|| self.next_id())
    }

    /// The oldest timestamp a running reader may still read at: the global
    /// oldest, held back by older read timestamps.
    #[must_use]
    pub fn pinned_oldest(&self) -> Timestamp {
        let oldest = self.clock.get().oldest;
        self.running
            .read()
            .values()
            .map(|r| r.read_ts)
            .filter(|ts| !ts.is_none())
            .fold(oldest, Timestamp::min)
    }

    /// Advances the global clocks. Returns whether `oldest` moved.
    pub fn set_timestamp(&self, config: &TimestampConfig) -> CoreResult<bool> {
        self.clock.set(config)
    }

    /// Reads one of the global timestamps.
    #[must_use]
    pub fn query(&self, which: QueryTimestamp) -> Timestamp {
        let clocks = self.clock.get();
        match which {
            QueryTimestamp::Oldest => clocks.oldest,
            QueryTimestamp::Stable => clocks.stable,
            QueryTimestamp::LastCheckpoint => clocks.last_checkpoint,
            QueryTimestamp::AllDurable => {
                let pending = self
                    .running
                    .read()
                    .values()
                    .map(|r| r.commit_ts)
                    .filter(|ts| !ts.is_none())
                    .min();
                match pending {
                    Some(ts) => Timestamp::new(ts.as_u64() - 1),
                    None => Timestamp::new(self.max_durable.load(Ordering::SeqCst)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TransactionManager {
        TransactionManager::new(Arc::new(DatabaseStats::new()))
    }

    fn ts(n: u64) -> Timestamp {
        Timestamp::new(n)
    }

    #[test]
    fn snapshots_exclude_running_transactions() {
        let tm = manager();
        let a = tm.begin(&BeginConfig::new()).unwrap();
        let b = tm.begin(&BeginConfig::new()).unwrap();
        assert!(!b.snapshot().sees(a.id()));
        assert!(!a.snapshot().sees(b.id()));
        let snap = tm.current_snapshot(TxnId::NONE);
        assert!(!snap.sees(a.id()));
        assert_eq!(tm.horizon(), a.id());
    }

    #[test]
    fn horizon_follows_the_oldest_snapshot() {
        let tm = manager();
        let mut a = tm.begin(&BeginConfig::new()).unwrap();
        let b = tm.begin(&BeginConfig::new()).unwrap();
        tm.commit(&mut a, &CommitConfig::new()).unwrap();
        // b began while a was running, so a stays behind the horizon.
        assert_eq!(tm.horizon(), a.id());
        drop(b);
    }

    #[test]
    fn running_readers_pin_oldest() {
        let tm = manager();
        tm.set_timestamp(&TimestampConfig::new().oldest(ts(10)).stable(ts(10)))
            .unwrap();
        let _reader = tm.begin(&BeginConfig::new().read_timestamp(ts(12))).unwrap();
        tm.set_timestamp(&TimestampConfig::new().oldest(ts(20)).stable(ts(20)))
            .unwrap();
        assert_eq!(tm.pinned_oldest(), ts(12));
    }

    #[test]
    fn committed_transaction_is_seen_by_later_snapshots() {
        let tm = manager();
        let mut a = tm.begin(&BeginConfig::new()).unwrap();
        tm.commit(&mut a, &CommitConfig::new()).unwrap();
        let b = tm.begin(&BeginConfig::new()).unwrap();
        assert!(b.snapshot().sees(a.id()));
        assert_eq!(a.state(), TxnState::Committed);
    }

    #[test]
    fn commit_timestamp_must_follow_stable() {
        let tm = manager();
        tm.set_timestamp(&TimestampConfig::new().stable(ts(10))).unwrap();
        let mut txn = tm.begin(&BeginConfig::new()).unwrap();
        let err = tm
            .commit(&mut txn, &CommitConfig::new().commit_timestamp(ts(10)))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        assert_eq!(txn.state(), TxnState::Running);
        tm.commit(&mut txn, &CommitConfig::new().commit_timestamp(ts(11)))
            .unwrap();
    }

    #[test]
    fn staged_commit_timestamp_is_rechecked_against_stable() {
        let tm = manager();
        tm.set_timestamp(&TimestampConfig::new().stable(ts(10))).unwrap();
        let mut txn = tm.begin(&BeginConfig::new()).unwrap();
        tm.timestamp_transaction(&mut txn, &TxnTimestampConfig::new().commit_timestamp(ts(11)))
            .unwrap();
        tm.set_timestamp(&TimestampConfig::new().stable(ts(20))).unwrap();

        let err = tm.commit(&mut txn, &CommitConfig::new()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        assert_eq!(txn.state(), TxnState::Running);
        tm.rollback(&mut txn, &RollbackConfig::new()).unwrap();
    }

    #[test]
    fn no_timestamp_commit_ignores_stable() {
        let tm = manager();
        tm.set_timestamp(&TimestampConfig::new().stable(ts(10))).unwrap();
        let mut txn = tm.begin(&BeginConfig::new().no_timestamp(true)).unwrap();
        tm.commit(&mut txn, &CommitConfig::new()).unwrap();
        assert_eq!(txn.state(), TxnState::Committed);
    }

    #[test]
    fn durable_timestamp_requires_prepare() {
        let tm = manager();
        let mut txn = tm.begin(&BeginConfig::new()).unwrap();
        let config = CommitConfig::new()
            .commit_timestamp(ts(5))
            .durable_timestamp(ts(6));
        assert!(tm.commit(&mut txn, &config).is_err());
    }

    #[test]
    fn prepared_commit_may_land_behind_stable() {
        let tm = manager();
        tm.set_timestamp(&TimestampConfig::new().stable(ts(10))).unwrap();
        let mut txn = tm.begin(&BeginConfig::new()).unwrap();
        tm.prepare(&mut txn, &PrepareConfig::at(ts(20))).unwrap();
        assert_eq!(tm.prepared().len(), 1);
        tm.set_timestamp(&TimestampConfig::new().stable(ts(30))).unwrap();

        let too_early = CommitConfig::new()
            .commit_timestamp(ts(25))
            .durable_timestamp(ts(30));
        assert!(tm.commit(&mut txn, &too_early).is_err());
        let config = CommitConfig::new()
            .commit_timestamp(ts(25))
            .durable_timestamp(ts(35));
        tm.commit(&mut txn, &config).unwrap();
        assert!(tm.prepared().is_empty());
        assert_eq!(tm.query(QueryTimestamp::AllDurable), ts(35));
    }

    #[test]
    fn prepare_must_follow_stable() {
        let tm = manager();
        tm.set_timestamp(&TimestampConfig::new().stable(ts(10))).unwrap();
        let mut txn = tm.begin(&BeginConfig::new()).unwrap();
        assert!(tm.prepare(&mut txn, &PrepareConfig::at(ts(10))).is_err());
        assert!(tm.prepare(&mut txn, &PrepareConfig::default()).is_err());
        assert_eq!(txn.state(), TxnState::Running);
    }

    #[test]
    fn prepared_rollback_needs_timestamp() {
        let tm = manager();
        let mut txn = tm.begin(&BeginConfig::new()).unwrap();
        tm.prepare(&mut txn, &PrepareConfig::at(ts(20))).unwrap();
        assert!(tm.rollback(&mut txn, &RollbackConfig::new()).is_err());
        assert!(tm
            .rollback(&mut txn, &RollbackConfig::new().rollback_timestamp(ts(19)))
            .is_err());
        tm.rollback(&mut txn, &RollbackConfig::new().rollback_timestamp(ts(20)))
            .unwrap();
        assert_eq!(txn.state(), TxnState::RolledBack);
        assert!(!tm.has_running());
    }

    #[test]
    fn read_timestamp_must_not_precede_oldest() {
        let tm = manager();
        tm.set_timestamp(&TimestampConfig::new().oldest(ts(10)).stable(ts(10)))
            .unwrap();
        assert!(tm.begin(&BeginConfig::new().read_timestamp(ts(9))).is_err());
        assert!(tm.begin(&BeginConfig::new().read_timestamp(ts(10))).is_ok());
    }

    #[test]
    fn all_durable_waits_for_pending_commits() {
        let tm = manager();
        let mut txn = tm.begin(&BeginConfig::new()).unwrap();
        tm.timestamp_transaction(&mut txn, &TxnTimestampConfig::new().commit_timestamp(ts(40)))
            .unwrap();
        assert_eq!(tm.query(QueryTimestamp::AllDurable), ts(39));
        tm.commit(&mut txn, &CommitConfig::new()).unwrap();
        assert_eq!(tm.query(QueryTimestamp::AllDurable), ts(40));
    }

    #[test]
    fn later_commit_timestamps_may_not_go_back() {
        let tm = manager();
        let mut txn = tm.begin(&BeginConfig::new()).unwrap();
        tm.timestamp_transaction(&mut txn, &TxnTimestampConfig::new().commit_timestamp(ts(40)))
            .unwrap();
        assert!(tm
            .timestamp_transaction(&mut txn, &TxnTimestampConfig::new().commit_timestamp(ts(39)))
            .is_err());
    }

    #[test]
    fn poisoned_commit_rolls_back() {
        let tm = manager();
        let mut txn = tm.begin(&BeginConfig::new()).unwrap();
        txn.mark_rollback_only("conflict");
        let err = tm.commit(&mut txn, &CommitConfig::new()).unwrap_err();
        assert!(err.requires_rollback());
        assert_eq!(txn.state(), TxnState::RolledBack);
    }
}
