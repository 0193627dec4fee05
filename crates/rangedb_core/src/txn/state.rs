//! Transaction state.

use super::{Snapshot, TxnWrites};
use crate::config::{BeginConfig, Isolation};
use crate::error::{CoreError, CoreResult};
use crate::store::ReadView;
use crate::types::{PreparedId, Timestamp, TxnId};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Reads and writes are allowed.
    Running,
    /// Waiting for the coordinator's commit or rollback.
    Prepared,
    /// Published.
    Committed,
    /// Discarded.
    RolledBack,
}

/// A transaction owned by one session.
///
/// Writes go straight into the shared tables as uncommitted versions; the
/// transaction remembers where they went so commit, prepare and rollback
/// can find them again.
#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    snapshot: Snapshot,
    isolation: Isolation,
    read_ts: Timestamp,
    first_commit_ts: Timestamp,
    commit_ts: Timestamp,
    durable_ts: Timestamp,
    prepare_ts: Timestamp,
    prepared_id: Option<PreparedId>,
    ignore_prepare: bool,
    no_timestamp: bool,
    implicit: bool,
    name: Option<String>,
    state: TxnState,
    rollback_reason: Option<String>,
    pub(crate) writes: TxnWrites,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, snapshot: Snapshot, config: &BeginConfig) -> Self {
        Self {
            id,
            snapshot,
            isolation: config.isolation.unwrap_or_default(),
            read_ts: config.read_timestamp.unwrap_or(Timestamp::NONE),
            first_commit_ts: Timestamp::NONE,
            commit_ts: Timestamp::NONE,
            durable_ts: Timestamp::NONE,
            prepare_ts: Timestamp::NONE,
            prepared_id: None,
            ignore_prepare: config.ignore_prepare,
            no_timestamp: config.no_timestamp,
            implicit: false,
            name: config.name.clone(),
            state: TxnState::Running,
            rollback_reason: None,
            writes: TxnWrites::default(),
        }
    }

    /// A transaction for a single autocommit operation.
    pub(crate) fn implicit(id: TxnId, snapshot: Snapshot) -> Self {
        let mut txn = Self::new(id, snapshot, &BeginConfig::new());
        txn.implicit = true;
        txn
    }

    /// A prepared transaction rebuilt from a checkpoint's journal.
    pub(crate) fn recovered(
        id: TxnId,
        snapshot: Snapshot,
        prepare_ts: Timestamp,
        prepared_id: Option<PreparedId>,
        writes: TxnWrites,
    ) -> Self {
        let mut txn = Self::new(id, snapshot, &BeginConfig::new());
        txn.state = TxnState::Prepared;
        txn.prepare_ts = prepare_ts;
        txn.prepared_id = prepared_id;
        txn.writes = writes;
        txn
    }

    /// Transaction id.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Name given at begin, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// The snapshot reads are judged against.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Isolation level.
    #[must_use]
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Read timestamp, or none.
    #[must_use]
    pub fn read_timestamp(&self) -> Timestamp {
        self.read_ts
    }

    /// Commit timestamp set so far, or none.
    #[must_use]
    pub fn commit_timestamp(&self) -> Timestamp {
        self.commit_ts
    }

    /// First commit timestamp set, or none.
    #[must_use]
    pub fn first_commit_timestamp(&self) -> Timestamp {
        self.first_commit_ts
    }

    /// Durable timestamp set so far, or none.
    #[must_use]
    pub fn durable_timestamp(&self) -> Timestamp {
        self.durable_ts
    }

    /// Prepare timestamp, or none.
    #[must_use]
    pub fn prepare_timestamp(&self) -> Timestamp {
        self.prepare_ts
    }

    /// Prepared id, once prepared.
    #[must_use]
    pub fn prepared_id(&self) -> Option<PreparedId> {
        self.prepared_id
    }

    /// Whether the transaction skips prepared updates when reading.
    #[must_use]
    pub fn ignore_prepare(&self) -> bool {
        self.ignore_prepare
    }

    /// Whether the transaction commits without a timestamp.
    #[must_use]
    pub fn no_timestamp(&self) -> bool {
        self.no_timestamp
    }

    /// Whether the transaction wraps a single autocommit operation.
    #[must_use]
    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    /// Whether the transaction is prepared.
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.state == TxnState::Prepared
    }

    /// Why the transaction must roll back, if a conflict poisoned it.
    #[must_use]
    pub fn rollback_reason(&self) -> Option<&str> {
        self.rollback_reason.as_deref()
    }

    /// What has been written.
    #[must_use]
    pub fn writes(&self) -> &TxnWrites {
        &self.writes
    }

    /// The visibility frontier of the transaction's reads.
    #[must_use]
    pub fn view(&self) -> ReadView {
        ReadView {
            txn: self.id,
            snapshot: self.snapshot.clone(),
            read_ts: self.read_ts,
            ignore_prepare: self.ignore_prepare,
        }
    }

    pub(crate) fn set_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshot = snapshot;
    }

    pub(crate) fn set_read_timestamp(&mut self, ts: Timestamp) {
        self.read_ts = ts;
    }

    pub(crate) fn set_commit_timestamp(&mut self, ts: Timestamp) {
        if self.first_commit_ts.is_none() {
            self.first_commit_ts = ts;
        }
        self.commit_ts = ts;
    }

    pub(crate) fn set_durable_timestamp(&mut self, ts: Timestamp) {
        self.durable_ts = ts;
    }

    pub(crate) fn mark_prepared(&mut self, prepare_ts: Timestamp, prepared_id: PreparedId) {
        self.state = TxnState::Prepared;
        self.prepare_ts = prepare_ts;
        self.prepared_id = Some(prepared_id);
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TxnState::Committed;
    }

    pub(crate) fn mark_rolled_back(&mut self) {
        self.state = TxnState::RolledBack;
    }

    pub(crate) fn mark_rollback_only(&mut self, reason: impl Into<String>) {
        if self.rollback_reason.is_none() {
            self.rollback_reason = Some(reason.into());
        }
    }

    /// Checks that the transaction may still read.
    pub(crate) fn ensure_readable(&self) -> CoreResult<()> {
        if let Some(reason) = &self.rollback_reason {
            return Err(CoreError::rollback_required(reason.clone()));
        }
        match self.state {
            TxnState::Running => Ok(()),
            TxnState::Prepared => Err(CoreError::invalid_argument(
                "a prepared transaction can only commit or roll back",
            )),
            TxnState::Committed | TxnState::RolledBack => {
                Err(CoreError::invalid_argument("transaction is no longer running"))
            }
        }
    }

    /// Checks that the transaction may write.
    pub(crate) fn ensure_writable(&self) -> CoreResult<()> {
        self.ensure_readable()?;
        if self.ignore_prepare {
            return Err(CoreError::invalid_argument(
                "transactions that ignore prepared updates are read-only",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn() -> Transaction {
        Transaction::new(TxnId::new(3), Snapshot::new(TxnId::new(3), vec![]), &BeginConfig::new())
    }

    #[test]
    fn new_transaction_is_running() {
        let txn = txn();
        assert_eq!(txn.state(), TxnState::Running);
        assert!(txn.ensure_writable().is_ok());
        assert!(txn.writes().is_empty());
        assert_eq!(txn.view().txn, TxnId::new(3));
    }

    #[test]
    fn first_commit_timestamp_is_kept() {
        let mut txn = txn();
        txn.set_commit_timestamp(Timestamp::new(10));
        txn.set_commit_timestamp(Timestamp::new(12));
        assert_eq!(txn.first_commit_timestamp(), Timestamp::new(10));
        assert_eq!(txn.commit_timestamp(), Timestamp::new(12));
    }

    #[test]
    fn prepared_transaction_rejects_operations() {
        let mut txn = txn();
        txn.mark_prepared(Timestamp::new(5), PreparedId::new(1));
        assert!(txn.is_prepared());
        assert!(matches!(
            txn.ensure_readable(),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn rollback_only_keeps_first_reason() {
        let mut txn = txn();
        txn.mark_rollback_only("first");
        txn.mark_rollback_only("second");
        assert_eq!(txn.rollback_reason(), Some("first"));
        assert!(txn.ensure_writable().unwrap_err().requires_rollback());
    }

    #[test]
    fn ignore_prepare_is_read_only() {
        let txn = Transaction::new(
            TxnId::new(1),
            Snapshot::all(),
            &BeginConfig::new().ignore_prepare(true),
        );
        assert!(txn.ensure_readable().is_ok());
        assert!(txn.ensure_writable().is_err());
    }
}
