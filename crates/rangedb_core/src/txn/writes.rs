//! The write set of a transaction.

use crate::schema::Key;
use crate::store::Table;
use crate::types::{TableId, Timestamp, TxnId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Keys one transaction touched in one table.
#[derive(Debug, Clone)]
pub(crate) struct TableWrites {
    pub(crate) table: Arc<Table>,
    pub(crate) keys: BTreeSet<Key>,
    /// Set when the transaction fast-deleted pages; resolution then walks
    /// the whole table instead of the key set.
    pub(crate) scan_all: bool,
}

/// Tables and keys written by a transaction.
#[derive(Debug, Clone, Default)]
pub struct TxnWrites {
    tables: BTreeMap<TableId, TableWrites>,
}

impl TxnWrites {
    fn entry(&mut self, table: &Arc<Table>) -> &mut TableWrites {
        self.tables
            .entry(table.id())
            .or_insert_with(|| TableWrites {
                table: Arc::clone(table),
                keys: BTreeSet::new(),
                scan_all: false,
            })
    }

    /// Records a write of `key` in `table`.
    pub(crate) fn record(&mut self, table: &Arc<Table>, key: Key) {
        self.entry(table).keys.insert(key);
    }

    /// Records that `table` holds a range reservation of this transaction,
    /// even if no key was written.
    pub(crate) fn record_range(&mut self, table: &Arc<Table>) {
        self.entry(table);
    }

    /// Records that pages of `table` carry fast-delete markers of this transaction.
    pub(crate) fn record_fast_delete(&mut self, table: &Arc<Table>) {
        self.entry(table).scan_all = true;
    }

    /// Whether nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of distinct keys written.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.tables.values().map(|t| t.keys.len()).sum()
    }

    pub(crate) fn tables(&self) -> impl Iterator<Item = &TableWrites> {
        self.tables.values()
    }

    pub(crate) fn prepare(&self, txn: TxnId, prepare_ts: Timestamp) {
        for w in self.tables.values() {
            w.table.tree.write().prepare_txn(txn, &w.keys, w.scan_all, prepare_ts);
        }
    }

    pub(crate) fn commit(&self, txn: TxnId, commit_ts: Timestamp, durable_ts: Timestamp) {
        for w in self.tables.values() {
            w.table
                .tree
                .write()
                .commit_txn(txn, &w.keys, w.scan_all, commit_ts, durable_ts);
        }
    }

    pub(crate) fn rollback(&self, txn: TxnId) {
        for w in self.tables.values() {
            w.table.tree.write().rollback_txn(txn, &w.keys, w.scan_all);
        }
    }
}
