//! The table catalog.

use crate::config::{DropConfig, TableConfig};
use crate::error::{BusyKind, CoreError, CoreResult};
use crate::schema::{KeyFormat, TableFormat, ValueFormat};
use crate::stats::DatabaseStats;
use crate::store::{IndexDef, Table, Tree};
use crate::types::TableId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const TABLE_PREFIX: &str = "table:";
const INDEX_PREFIX: &str = "index:";

/// Splits `index:<table>:<name>` into the indexed table's URI and the index name.
pub(crate) fn parse_index_uri(uri: &str) -> CoreResult<(String, &str)> {
    let rest = uri
        .strip_prefix(INDEX_PREFIX)
        .ok_or_else(|| CoreError::invalid_argument(format!("{uri} is not an index URI")))?;
    match rest.split_once(':') {
        Some((table, name)) if !table.is_empty() && !name.is_empty() => {
            Ok((format!("{TABLE_PREFIX}{table}"), name))
        }
        _ => Err(CoreError::invalid_argument(format!(
            "index URI {uri} must look like index:<table>:<name>"
        ))),
    }
}

fn check_table_uri(uri: &str) -> CoreResult<()> {
    match uri.strip_prefix(TABLE_PREFIX) {
        Some(name) if !name.is_empty() && !name.contains(':') => Ok(()),
        _ => Err(CoreError::invalid_argument(format!(
            "table URI {uri} must look like table:<name>"
        ))),
    }
}

/// Named tables and indexes of one database.
#[derive(Debug)]
pub struct Catalog {
    tables: RwLock<BTreeMap<String, Arc<Table>>>,
    next_id: AtomicU32,
    leaf_page_max_entries: usize,
    stats: Arc<DatabaseStats>,
}

impl Catalog {
    /// Creates an empty catalog whose trees split above `leaf_page_max_entries`.
    pub fn new(leaf_page_max_entries: usize, stats: Arc<DatabaseStats>) -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            leaf_page_max_entries,
            stats,
        }
    }

    fn allocate_id(&self) -> TableId {
        TableId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Creates a table; creating an existing table with the same
    /// configuration returns it.
    pub fn create(&self, uri: &str, config: TableConfig) -> CoreResult<Arc<Table>> {
        check_table_uri(uri)?;
        config.format.validate()?;
        let mut tables = self.tables.write();
        if let Some(existing) = tables.get(uri) {
            if existing.config() == &config {
                return Ok(Arc::clone(existing));
            }
            return Err(CoreError::invalid_argument(format!(
                "{uri} already exists with a different configuration"
            )));
        }
        let table = Arc::new(Table::new(
            self.allocate_id(),
            uri,
            config,
            None,
            Tree::new(self.leaf_page_max_entries),
            Arc::clone(&self.stats),
        ));
        tables.insert(uri.to_string(), Arc::clone(&table));
        tracing::debug!(uri, id = %table.id(), "created table");
        Ok(table)
    }

    /// Creates a secondary index over value columns of a row-store table and
    /// fills it from the table's committed rows.
    pub fn create_index(&self, uri: &str, columns: &[usize]) -> CoreResult<Arc<Table>> {
        let (table_uri, _) = parse_index_uri(uri)?;
        if columns.is_empty() {
            return Err(CoreError::invalid_argument("an index needs at least one column"));
        }
        let mut tables = self.tables.write();
        if tables.contains_key(uri) {
            return Err(CoreError::invalid_argument(format!("{uri} already exists")));
        }
        let table = tables
            .get(&table_uri)
            .cloned()
            .ok_or_else(|| CoreError::invalid_argument(format!("no such table: {table_uri}")))?;
        let TableFormat::Row { key, value } = table.format() else {
            return Err(CoreError::not_supported(format!(
                "{table_uri} is a column store; only row stores can be indexed"
            )));
        };
        let fields = columns
            .iter()
            .map(|c| value.column_format(*c))
            .collect::<CoreResult<Vec<_>>>()?;
        let def = IndexDef {
            table: table_uri.clone(),
            columns: columns.to_vec(),
            fields: fields.clone(),
        };
        let format = TableFormat::row(KeyFormat::Composite(fields), primary_key_value(key));
        let index = Arc::new(Table::new(
            self.allocate_id(),
            uri,
            TableConfig::new(format),
            Some(def),
            Tree::new(self.leaf_page_max_entries),
            Arc::clone(&self.stats),
        ));
        table.build_index(&index)?;
        table.add_index(Arc::clone(&index));
        tables.insert(uri.to_string(), Arc::clone(&index));
        tracing::debug!(uri, table = %table_uri, "created index");
        Ok(index)
    }

    /// Looks up a table or index.
    pub fn get(&self, uri: &str) -> CoreResult<Arc<Table>> {
        self.tables
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| CoreError::invalid_argument(format!("no such object: {uri}")))
    }

    /// Drops a table (with its indexes) or a single index.
    pub fn drop(&self, uri: &str, config: &DropConfig) -> CoreResult<()> {
        let mut tables = self.tables.write();
        let Some(table) = tables.get(uri).cloned() else {
            if config.force {
                return Ok(());
            }
            return Err(CoreError::invalid_argument(format!("no such object: {uri}")));
        };
        let doomed: Vec<Arc<Table>> = std::iter::once(Arc::clone(&table))
            .chain(table.indexes())
            .collect();
        for t in &doomed {
            if t.open_cursors() > 0 {
                return Err(CoreError::busy(
                    BusyKind::Dhandle,
                    format!("{} has {} open cursors", t.uri(), t.open_cursors()),
                ));
            }
            if t.tree.read().has_unresolved() {
                return Err(CoreError::busy(
                    BusyKind::UncommittedData,
                    format!("{} has uncommitted updates", t.uri()),
                ));
            }
        }
        if let Some(def) = table.index_def() {
            if let Some(parent) = tables.get(&def.table) {
                parent.remove_index(uri);
            }
        }
        for t in &doomed {
            tables.remove(t.uri());
        }
        tracing::debug!(uri, "dropped");
        Ok(())
    }

    /// Every table and index, in URI order.
    #[must_use]
    pub fn tables(&self) -> Vec<Arc<Table>> {
        self.tables.read().values().cloned().collect()
    }

    /// Registers a table rebuilt by recovery. Indexes are linked to their
    /// tables by [`Catalog::link_indexes`] once everything is registered.
    pub(crate) fn restore(
        &self,
        uri: &str,
        config: TableConfig,
        index: Option<IndexDef>,
        tree: Tree,
    ) -> Arc<Table> {
        let table = Arc::new(Table::new(
            self.allocate_id(),
            uri,
            config,
            index,
            tree,
            Arc::clone(&self.stats),
        ));
        self.tables
            .write()
            .insert(uri.to_string(), Arc::clone(&table));
        table
    }

    pub(crate) fn link_indexes(&self) -> CoreResult<()> {
        let tables = self.tables.read();
        for table in tables.values() {
            if let Some(def) = table.index_def() {
                let parent = tables.get(&def.table).ok_or_else(|| {
                    CoreError::corrupt_checkpoint(format!(
                        "index {} refers to missing table {}",
                        table.uri(),
                        def.table
                    ))
                })?;
                parent.add_index(Arc::clone(table));
            }
        }
        Ok(())
    }

    /// Trees split above this many records.
    #[must_use]
    pub fn leaf_page_max_entries(&self) -> usize {
        self.leaf_page_max_entries
    }
}

/// The value format index cursors use for the primary key.
fn primary_key_value(key: &KeyFormat) -> ValueFormat {
    match key {
        KeyFormat::Int | KeyFormat::Recno => ValueFormat::Int,
        KeyFormat::String | KeyFormat::FixedString(_) => ValueFormat::String,
        KeyFormat::Bytes => ValueFormat::Bytes,
        KeyFormat::Composite(fields) => ValueFormat::Composite(fields.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldFormat;

    fn catalog() -> Catalog {
        Catalog::new(16, Arc::new(DatabaseStats::new()))
    }

    fn row_config() -> TableConfig {
        TableConfig::new(TableFormat::row(
            KeyFormat::Int,
            ValueFormat::Composite(vec![FieldFormat::String, FieldFormat::Int]),
        ))
    }

    #[test]
    fn create_is_idempotent_for_same_config() {
        let cat = catalog();
        let a = cat.create("table:t", row_config()).unwrap();
        let b = cat.create("table:t", row_config()).unwrap();
        assert_eq!(a.id(), b.id());
        let other = TableConfig::new(TableFormat::fixed_column(8));
        assert!(cat.create("table:t", other).is_err());
    }

    #[test]
    fn uris_are_checked() {
        let cat = catalog();
        assert!(cat.create("t", row_config()).is_err());
        assert!(cat.create("table:", row_config()).is_err());
        assert!(parse_index_uri("index:t").is_err());
        assert_eq!(
            parse_index_uri("index:t:by_name").unwrap(),
            ("table:t".to_string(), "by_name")
        );
    }

    #[test]
    fn index_is_linked_and_dropped_with_table() {
        let cat = catalog();
        let table = cat.create("table:t", row_config()).unwrap();
        let index = cat.create_index("index:t:name", &[0]).unwrap();
        assert_eq!(table.indexes().len(), 1);
        assert_eq!(index.index_def().unwrap().fields, vec![FieldFormat::String]);
        cat.drop("table:t", &DropConfig::new()).unwrap();
        assert!(cat.get("index:t:name").is_err());
        assert!(cat.tables().is_empty());
    }

    #[test]
    fn drop_with_open_cursor_is_busy() {
        let cat = catalog();
        let table = cat.create("table:t", row_config()).unwrap();
        table.cursor_opened();
        let err = cat.drop("table:t", &DropConfig::new()).unwrap_err();
        assert_eq!(err.busy_kind(), Some(BusyKind::Dhandle));
        table.cursor_closed();
        cat.drop("table:t", &DropConfig::new()).unwrap();
    }

    #[test]
    fn drop_missing_needs_force() {
        let cat = catalog();
        assert!(cat.drop("table:nope", &DropConfig::new()).is_err());
        assert!(cat.drop("table:nope", &DropConfig::new().force(true)).is_ok());
    }

    #[test]
    fn column_stores_cannot_be_indexed() {
        let cat = catalog();
        cat.create("table:c", TableConfig::new(TableFormat::fixed_column(8)))
            .unwrap();
        let err = cat.create_index("index:c:v", &[0]).unwrap_err();
        assert!(matches!(err, CoreError::NotSupported { .. }));
    }
}
