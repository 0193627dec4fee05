//! The prepared-transaction journal.
//!
//! A checkpoint that captures versions of prepared transactions lists, for
//! each such transaction, where its versions live. Recovery consults the
//! journal before admitting writes: the listed versions are either rolled
//! back or handed to a reinstated prepared transaction.

use crate::schema::Key;
use crate::txn::PreparedRecord;
use crate::types::{PreparedId, Timestamp, TxnId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One prepared transaction captured by a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Transaction id.
    pub txn: TxnId,
    /// Coordinator id.
    pub prepared_id: PreparedId,
    /// Prepare timestamp.
    pub prepare_ts: Timestamp,
    /// Keys holding its versions, per table URI.
    pub tables: BTreeMap<String, BTreeSet<Key>>,
}

impl JournalEntry {
    /// Number of keys the transaction wrote.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.tables.values().map(BTreeSet::len).sum()
    }
}

/// Prepared transactions of one checkpoint, by transaction id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedJournal {
    entries: BTreeMap<TxnId, JournalEntry>,
}

impl PreparedJournal {
    /// A journal with an empty entry for each prepared transaction.
    #[must_use]
    pub fn for_prepared(prepared: &[PreparedRecord]) -> Self {
        let entries = prepared
            .iter()
            .map(|r| {
                (
                    r.txn,
                    JournalEntry {
                        txn: r.txn,
                        prepared_id: r.prepared_id,
                        prepare_ts: r.prepare_ts,
                        tables: BTreeMap::new(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Whether `txn` is one of the journaled transactions.
    #[must_use]
    pub fn contains(&self, txn: TxnId) -> bool {
        self.entries.contains_key(&txn)
    }

    /// Notes that `txn` has a version of `key` in table `uri`. Unknown
    /// transactions are ignored.
    pub fn note(&mut self, txn: TxnId, uri: &str, key: &Key) {
        if let Some(entry) = self.entries.get_mut(&txn) {
            entry
                .tables
                .entry(uri.to_string())
                .or_default()
                .insert(key.clone());
        }
    }

    /// Journaled transactions in id order.
    pub fn entries(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.values()
    }

    /// Number of journaled transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no prepared transaction was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_only_journaled_transactions() {
        let mut journal = PreparedJournal::for_prepared(&[PreparedRecord {
            txn: TxnId::new(7),
            prepared_id: PreparedId::new(70),
            prepare_ts: Timestamp::new(20),
        }]);
        journal.note(TxnId::new(7), "table:t", &Key::int(1));
        journal.note(TxnId::new(7), "table:t", &Key::int(1));
        journal.note(TxnId::new(7), "table:u", &Key::int(2));
        journal.note(TxnId::new(8), "table:t", &Key::int(3));

        assert_eq!(journal.len(), 1);
        assert!(journal.contains(TxnId::new(7)));
        let entry = journal.entries().next().unwrap();
        assert_eq!(entry.key_count(), 2);
        assert_eq!(entry.prepared_id, PreparedId::new(70));
    }
}
