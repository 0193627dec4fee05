//! Tables and their secondary indexes.

use super::tree::Tree;
use super::version::{Payload, UpdateMeta, Version};
use super::visibility::{ReadView, Resolved};
use crate::config::{TableConfig, TableKind};
use crate::error::{CoreError, CoreResult};
use crate::schema::{FieldFormat, Key, Modify, TableFormat, Value};
use crate::stats::DatabaseStats;
use crate::txn::TxnWrites;
use crate::types::TableId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// URI of the indexed table.
    pub table: String,
    /// Value columns making up the index key.
    pub columns: Vec<usize>,
    /// Formats of those columns.
    pub fields: Vec<FieldFormat>,
}

/// A single-record write.
#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    Insert(Value),
    Update(Value),
    Remove,
    Reserve,
    Modify(Vec<Modify>),
}

/// A table (or index) shared by every session.
#[derive(Debug)]
pub struct Table {
    id: TableId,
    uri: String,
    config: TableConfig,
    index: Option<IndexDef>,
    pub(crate) tree: RwLock<Tree>,
    indexes: RwLock<Vec<Arc<Table>>>,
    open_cursors: AtomicUsize,
    stats: Arc<DatabaseStats>,
}

impl Table {
    pub(crate) fn new(
        id: TableId,
        uri: impl Into<String>,
        config: TableConfig,
        index: Option<IndexDef>,
        tree: Tree,
        stats: Arc<DatabaseStats>,
    ) -> Self {
        Self {
            id,
            uri: uri.into(),
            config,
            index,
            tree: RwLock::new(tree),
            indexes: RwLock::new(Vec::new()),
            open_cursors: AtomicUsize::new(0),
            stats,
        }
    }

    /// Catalog id.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// URI (`table:<name>` or `index:<table>:<name>`).
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Storage layout and formats.
    #[must_use]
    pub fn format(&self) -> &TableFormat {
        &self.config.format
    }

    /// Creation configuration.
    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Engine type.
    #[must_use]
    pub fn kind(&self) -> TableKind {
        self.config.kind
    }

    /// Index definition, when this table is an index.
    #[must_use]
    pub fn index_def(&self) -> Option<&IndexDef> {
        self.index.as_ref()
    }

    /// Indexes maintained alongside this table.
    #[must_use]
    pub fn indexes(&self) -> Vec<Arc<Table>> {
        self.indexes.read().clone()
    }

    pub(crate) fn add_index(&self, index: Arc<Table>) {
        self.indexes.write().push(index);
    }

    pub(crate) fn remove_index(&self, uri: &str) {
        self.indexes.write().retain(|i| i.uri != uri);
    }

    /// Number of records, including removed ones still holding history.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.tree.read().len()
    }

    pub(crate) fn cursor_opened(&self) {
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn cursor_closed(&self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of cursors currently open on the table.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Builds the entry key of this index for a row of the indexed table.
    pub(crate) fn index_entry_key(&self, value: &Value, primary: &Key) -> CoreResult<Key> {
        let def = self
            .index
            .as_ref()
            .ok_or_else(|| CoreError::fatal(format!("{} is not an index", self.uri)))?;
        let mut fields = def
            .columns
            .iter()
            .map(|c| value.column_as_key(*c))
            .collect::<CoreResult<Vec<_>>>()?;
        fields.push(primary.clone());
        Ok(Key::Composite(fields))
    }

    /// Applies one write on behalf of the transaction reading through `view`.
    ///
    /// Conflicts are checked on the record and on every affected index entry
    /// before anything is written. Returns `None` when nothing was written
    /// (removing an absent record with overwrite), otherwise the new value
    /// (`Some(None)` for removals and reserves).
    pub(crate) fn write(
        self: &Arc<Self>,
        view: &ReadView,
        key: Key,
        op: WriteOp,
        overwrite: bool,
        writes: &mut TxnWrites,
    ) -> CoreResult<Option<Option<Value>>> {
        let mut tree = self.tree.write();
        tree.check_write(&key, view)?;
        let current = match tree.get(&key, view) {
            Resolved::Value(v) => Some(v.clone()),
            Resolved::Conflict => {
                return Err(CoreError::rollback_required(format!(
                    "key {key} has a prepared update"
                )))
            }
            Resolved::Tombstone | Resolved::Absent => None,
        };
        let exists = current.is_some()
            || (self.format().is_fixed_column()
                && key.as_recno().map_or(false, |r| r <= tree.logical_end(view)));

        let payload = match op {
            WriteOp::Insert(value) => {
                if exists && !overwrite {
                    return Err(CoreError::DuplicateKey);
                }
                Payload::Value(value)
            }
            WriteOp::Update(value) => {
                if !exists && !overwrite {
                    return Err(CoreError::NotFound);
                }
                Payload::Value(value)
            }
            WriteOp::Remove => {
                if !exists {
                    return if overwrite {
                        Ok(None)
                    } else {
                        Err(CoreError::NotFound)
                    };
                }
                Payload::Tombstone
            }
            WriteOp::Reserve => {
                if !exists {
                    return Err(CoreError::NotFound);
                }
                Payload::Reserve
            }
            WriteOp::Modify(mods) => {
                let base = current.as_ref().ok_or(CoreError::NotFound)?;
                Payload::Value(base.apply_modifications(&mods)?)
            }
        };

        let new_value = match &payload {
            Payload::Value(v) => Some(v.clone()),
            _ => None,
        };
        let indexes = if matches!(payload, Payload::Reserve) {
            Vec::new()
        } else {
            self.indexes()
        };
        let mut index_updates = Vec::with_capacity(indexes.len());
        for index in &indexes {
            let old_key = current
                .as_ref()
                .map(|v| index.index_entry_key(v, &key))
                .transpose()?;
            let new_key = new_value
                .as_ref()
                .map(|v| index.index_entry_key(v, &key))
                .transpose()?;
            if old_key == new_key {
                continue;
            }
            let index_tree = index.tree.write();
            for k in old_key.iter().chain(new_key.iter()) {
                index_tree.check_write(k, view)?;
            }
            index_updates.push((index, index_tree, old_key, new_key));
        }

        let meta = UpdateMeta::uncommitted(view.txn);
        if tree.put(key.clone(), Version::new(meta, payload)) {
            self.stats.record_page_instantiated();
        }
        drop(tree);
        writes.record(self, key.clone());

        for (index, mut index_tree, old, new) in index_updates {
            if let Some(old) = old {
                index_tree.del(old.clone(), view.txn);
                writes.record(index, old);
            }
            if let Some(new) = new {
                let value = Value::from_key(&key);
                index_tree.put(new.clone(), Version::new(meta, Payload::Value(value)));
                writes.record(index, new);
            }
        }
        Ok(Some(new_value))
    }

    /// Copies the latest committed rows into a freshly created index.
    pub(crate) fn build_index(&self, index: &Table) -> CoreResult<()> {
        let tree = self.tree.read();
        if tree.has_unresolved() {
            return Err(CoreError::busy(
                crate::error::BusyKind::UncommittedData,
                format!("{} has uncommitted updates", self.uri),
            ));
        }
        let view = ReadView::latest();
        let mut index_tree = index.tree.write();
        for entry in tree.iter_from(Bound::Unbounded) {
            let Resolved::Value(value) = entry.resolve(&view) else {
                continue;
            };
            let Some(newest) = entry.chain.newest() else {
                continue;
            };
            let index_key = index.index_entry_key(value, entry.key)?;
            index_tree.put(
                index_key,
                Version::new(newest.meta, Payload::Value(Value::from_key(entry.key))),
            );
        }
        Ok(())
    }
}
