//! The contents of a checkpoint and how they are captured.

use super::journal::PreparedJournal;
use crate::catalog::Catalog;
use crate::config::TableConfig;
use crate::schema::Key;
use crate::stats::DatabaseStats;
use crate::store::{IndexDef, Payload, Table, Tree, UpdateMeta, UpdateState, Version, VersionChain};
use crate::txn::{Clocks, PreparedRecord};
use crate::types::{TableId, Timestamp, TxnId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// The captured versions of one table or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableImage {
    /// Table URI.
    pub uri: String,
    /// Table configuration.
    pub config: TableConfig,
    /// Index definition, for indexes.
    pub index: Option<IndexDef>,
    /// Records in key order, each with its versions oldest first.
    pub records: Vec<(Key, Vec<Version>)>,
}

impl TableImage {
    /// Number of records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Rebuilds the tree, with pages split above `max_entries` records.
    #[must_use]
    pub fn to_tree(&self, max_entries: usize) -> Tree {
        let records: BTreeMap<Key, VersionChain> = self
            .records
            .iter()
            .map(|(key, versions)| (key.clone(), VersionChain::from_versions(versions.clone())))
            .collect();
        Tree::from_records(max_entries, records)
    }
}

/// Everything a checkpoint captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointImage {
    /// Unique id of this image.
    pub id: Uuid,
    /// Checkpoint name.
    pub name: String,
    /// Position among the checkpoints of the database; later is larger.
    pub sequence: u64,
    /// Wall-clock creation time, in milliseconds since the Unix epoch.
    pub created_ms: u64,
    /// Global clocks at checkpoint start.
    pub oldest: Timestamp,
    /// The stable timestamp the image is consistent at.
    pub stable: Timestamp,
    /// First transaction id not yet handed out.
    pub next_txn_id: TxnId,
    /// Every table and index.
    pub tables: Vec<TableImage>,
    /// Prepared transactions whose versions the image holds.
    pub journal: PreparedJournal,
}

impl CheckpointImage {
    /// The image of table `uri`.
    #[must_use]
    pub fn table(&self, uri: &str) -> Option<&TableImage> {
        self.tables.iter().find(|t| t.uri == uri)
    }

    /// Read-only tables over the image, keyed by URI.
    pub(crate) fn detached_tables(
        &self,
        max_entries: usize,
        stats: &Arc<DatabaseStats>,
    ) -> BTreeMap<String, Arc<Table>> {
        self.tables
            .iter()
            .zip(1u32..)
            .map(|(image, id)| {
                let table = Table::new(
                    TableId::new(id),
                    image.uri.clone(),
                    image.config.clone(),
                    image.index.clone(),
                    image.to_tree(max_entries),
                    Arc::clone(stats),
                );
                (image.uri.clone(), Arc::new(table))
            })
            .collect()
    }
}

/// What a checkpoint starts from: the global state taken while transaction
/// resolution is frozen.
#[derive(Debug, Clone)]
pub(crate) struct CaptureState {
    pub(crate) clocks: Clocks,
    pub(crate) prepared: Vec<PreparedRecord>,
    pub(crate) next_txn_id: TxnId,
}

/// Whether a version belongs in a checkpoint consistent at `stable`.
fn captured(meta: &UpdateMeta, stable: Timestamp, journal: &PreparedJournal) -> bool {
    match meta.state {
        UpdateState::Uncommitted => false,
        UpdateState::Prepared => journal.contains(meta.txn),
        UpdateState::Committed => {
            stable.is_none() || meta.commit_ts.is_none() || meta.commit_ts <= stable
        }
    }
}

/// Captures every table of `catalog`.
///
/// Transaction resolution must be frozen for the duration, so every
/// version is either committed, prepared by a transaction in
/// `state.prepared`, or invisible to the checkpoint.
pub(crate) fn capture(
    name: &str,
    sequence: u64,
    created_ms: u64,
    catalog: &Catalog,
    state: &CaptureState,
) -> CheckpointImage {
    let stable = state.clocks.stable;
    let mut journal = PreparedJournal::for_prepared(&state.prepared);
    let mut tables = Vec::new();

    for table in catalog.tables() {
        let tree = table.tree.read();
        let mut records = Vec::new();
        for page in tree.pages() {
            let marker = page.deleted().filter(|m| captured(&m.meta, stable, &journal));
            for (key, chain) in page.entries() {
                let mut versions: Vec<Version> = chain
                    .versions()
                    .iter()
                    .filter(|v| !matches!(v.payload, Payload::Reserve))
                    .filter(|v| captured(&v.meta, stable, &journal))
                    .cloned()
                    .collect();
                // A page marker is newer than every version under it.
                if let Some(marker) = marker {
                    versions.push(Version::new(marker.meta, Payload::Tombstone));
                }
                if versions.is_empty() {
                    continue;
                }
                for version in &versions {
                    if version.meta.state == UpdateState::Prepared {
                        journal.note(version.meta.txn, table.uri(), key);
                    }
                }
                records.push((key.clone(), versions));
            }
        }
        tables.push(TableImage {
            uri: table.uri().to_string(),
            config: table.config().clone(),
            index: table.index_def().cloned(),
            records,
        });
    }

    CheckpointImage {
        id: Uuid::new_v4(),
        name: name.to_string(),
        sequence,
        created_ms,
        oldest: state.clocks.oldest,
        stable,
        next_txn_id: state.next_txn_id,
        tables,
        journal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KeyFormat, TableFormat, Value, ValueFormat};
    use crate::types::PreparedId;

    fn ts(n: u64) -> Timestamp {
        Timestamp::new(n)
    }

    fn committed(commit: u64, value: &str) -> Version {
        Version::new(
            UpdateMeta::committed(ts(commit), ts(commit)),
            Payload::Value(Value::str(value)),
        )
    }

    fn catalog_with(records: Vec<(i64, Vec<Version>)>) -> Catalog {
        let stats = Arc::new(DatabaseStats::new());
        let catalog = Catalog::new(4, stats);
        let table = catalog
            .create(
                "table:t",
                TableConfig::new(TableFormat::Row {
                    key: KeyFormat::Int,
                    value: ValueFormat::String,
                }),
            )
            .unwrap();
        let map = records
            .into_iter()
            .map(|(k, v)| (Key::int(k), VersionChain::from_versions(v)))
            .collect();
        *table.tree.write() = Tree::from_records(4, map);
        catalog
    }

    fn state(stable: u64, prepared: Vec<PreparedRecord>) -> CaptureState {
        CaptureState {
            clocks: Clocks {
                oldest: Timestamp::NONE,
                stable: ts(stable),
                last_checkpoint: Timestamp::NONE,
            },
            prepared,
            next_txn_id: TxnId::new(100),
        }
    }

    #[test]
    fn versions_after_stable_are_left_out() {
        let catalog = catalog_with(vec![
            (1, vec![committed(5, "a"), committed(15, "b")]),
            (2, vec![committed(15, "c")]),
        ]);
        let image = capture("c", 1, 0, &catalog, &state(10, Vec::new()));
        let table = image.table("table:t").unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].1, vec![committed(5, "a")]);
        assert_eq!(image.next_txn_id, TxnId::new(100));
    }

    #[test]
    fn prepared_versions_are_journaled() {
        let txn = TxnId::new(42);
        let mut meta = UpdateMeta::uncommitted(txn);
        meta.prepare(ts(20));
        let prepared = Version::new(meta, Payload::Value(Value::str("p")));
        let stray = Version::new(UpdateMeta::uncommitted(TxnId::new(43)), Payload::Tombstone);
        let catalog = catalog_with(vec![(1, vec![committed(5, "a"), prepared.clone(), stray])]);

        let record = PreparedRecord {
            txn,
            prepared_id: PreparedId::new(9),
            prepare_ts: ts(20),
        };
        let image = capture("c", 1, 0, &catalog, &state(10, vec![record]));
        let table = image.table("table:t").unwrap();
        assert_eq!(table.records[0].1, vec![committed(5, "a"), prepared]);
        let entry = image.journal.entries().next().unwrap();
        assert_eq!(entry.txn, txn);
        assert_eq!(entry.key_count(), 1);
    }

    #[test]
    fn committed_page_marker_becomes_tombstones() {
        let catalog = catalog_with(vec![
            (1, vec![committed(5, "a")]),
            (2, vec![committed(5, "b")]),
        ]);
        let table = catalog.get("table:t").unwrap();
        {
            let mut tree = table.tree.write();
            tree.mark_deleted(0, TxnId::new(50));
            tree.commit_txn(TxnId::new(50), &Default::default(), true, ts(8), ts(8));
        }
        let image = capture("c", 1, 0, &catalog, &state(10, Vec::new()));
        let records = &image.table("table:t").unwrap().records;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|(_, v)| v.last().map_or(false, Version::is_tombstone)));

        let tree = image.table("table:t").unwrap().to_tree(4);
        assert_eq!(tree.len(), 2);
    }
}
