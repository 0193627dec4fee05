//! Transaction snapshots.

use crate::types::TxnId;
use std::sync::Arc;

/// The set of transactions whose writes a reader may see.
///
/// Every id below `max` that is not listed as concurrent had finished when
/// the snapshot was taken.
#[derive(Debug, Clone)]
pub struct Snapshot {
    max: TxnId,
    concurrent: Arc<[TxnId]>,
}

impl Snapshot {
    /// Creates a snapshot from the id high-water mark and the running set.
    #[must_use]
    pub fn new(max: TxnId, mut concurrent: Vec<TxnId>) -> Self {
        concurrent.sort_unstable();
        Self {
            max,
            concurrent: concurrent.into(),
        }
    }

    /// A snapshot that sees every committed transaction.
    #[must_use]
    pub fn all() -> Self {
        Self {
            max: TxnId::new(u64::MAX),
            concurrent: Arc::from(Vec::new()),
        }
    }

    /// Whether writes of `txn` are visible to this snapshot once committed.
    #[must_use]
    pub fn sees(&self, txn: TxnId) -> bool {
        txn == TxnId::NONE || (txn < self.max && self.concurrent.binary_search(&txn).is_err())
    }

    /// The id high-water mark.
    #[must_use]
    pub const fn max(&self) -> TxnId {
        self.max
    }

    /// Transactions running when the snapshot was taken.
    #[must_use]
    pub fn concurrent(&self) -> &[TxnId] {
        &self.concurrent
    }

    /// The oldest id not yet known to be finished.
    #[must_use]
    pub fn horizon(&self) -> TxnId {
        self.concurrent.first().copied().unwrap_or(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_transactions_are_hidden() {
        let snap = Snapshot::new(TxnId::new(10), vec![TxnId::new(7), TxnId::new(3)]);
        assert!(snap.sees(TxnId::new(1)));
        assert!(!snap.sees(TxnId::new(3)));
        assert!(!snap.sees(TxnId::new(7)));
        assert!(!snap.sees(TxnId::new(10)));
        assert!(snap.sees(TxnId::NONE));
        assert_eq!(snap.horizon(), TxnId::new(3));
    }

    #[test]
    fn all_sees_everything_finished() {
        let snap = Snapshot::all();
        assert!(snap.sees(TxnId::new(123_456)));
        assert!(snap.concurrent().is_empty());
    }
}
