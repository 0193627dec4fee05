//! Range truncate.
//!
//! A truncate removes every live record in an interval on behalf of one
//! transaction. Conflicts over the whole interval are checked before
//! anything is written. Row-store pages lying wholly inside the interval
//! are removed with a single fast-delete marker instead of per-record
//! tombstones; rolling the transaction back drops the marker and the page
//! reappears unchanged. Until the transaction resolves, the interval stays
//! reserved against writes by other transactions, including inserts of keys
//! that did not exist when the truncate ran.

use crate::cursor::{Bounds, Cursor, KeyBound};
use crate::error::{CoreError, CoreResult};
use crate::schema::{Key, TableFormat, Value};
use crate::stats::DatabaseStats;
use crate::store::{Payload, ReadView, Resolved, Table, UpdateMeta, Version};
use crate::txn::TxnWrites;
use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::Arc;

/// The interval a truncate covers.
#[derive(Debug)]
pub(crate) struct TruncateRange {
    table: Arc<Table>,
    start: Option<Key>,
    stop: Option<Key>,
    /// Bounds of the endpoint cursors; they clip the interval.
    filters: Vec<Bounds>,
}

impl TruncateRange {
    /// Everything in `table`.
    pub(crate) fn whole(table: Arc<Table>) -> Self {
        Self {
            table,
            start: None,
            stop: None,
            filters: Vec::new(),
        }
    }

    /// The interval between two cursors; a missing cursor leaves that end open.
    pub(crate) fn between(start: Option<&Cursor<'_>>, stop: Option<&Cursor<'_>>) -> CoreResult<Self> {
        let table = match (start, stop) {
            (Some(a), Some(b)) => {
                if !Arc::ptr_eq(a.table(), b.table()) {
                    return Err(CoreError::invalid_argument(
                        "truncate cursors must be on the same table",
                    ));
                }
                Arc::clone(a.table())
            }
            (Some(c), None) | (None, Some(c)) => Arc::clone(c.table()),
            (None, None) => {
                return Err(CoreError::invalid_argument(
                    "truncate needs a URI or at least one cursor",
                ))
            }
        };
        for cursor in start.iter().chain(stop.iter()) {
            if cursor.is_checkpoint() || table.index_def().is_some() {
                return Err(CoreError::invalid_argument(
                    "truncate cursors must be open on a live table",
                ));
            }
        }
        let start_key = start.map(Cursor::endpoint).transpose()?;
        let stop_key = stop.map(Cursor::endpoint).transpose()?;
        if let (Some(a), Some(b)) = (&start_key, &stop_key) {
            if a > b {
                return Err(CoreError::invalid_argument(format!(
                    "truncate start {a} is after stop {b}"
                )));
            }
        }
        let filters = start
            .iter()
            .chain(stop.iter())
            .map(|c| c.bounds().clone())
            .filter(Bounds::is_active)
            .collect();
        Ok(Self {
            table,
            start: start_key,
            stop: stop_key,
            filters,
        })
    }

    /// Table being truncated.
    pub(crate) fn table(&self) -> &Arc<Table> {
        &self.table
    }

    fn before_start(&self, key: &Key) -> bool {
        self.start.as_ref().map_or(false, |s| key < s)
            || self.filters.iter().any(|f| f.below_lower(key))
    }

    fn past_stop(&self, key: &Key) -> bool {
        self.stop.as_ref().map_or(false, |s| key > s)
            || self.filters.iter().any(|f| f.above_upper(key))
    }

    fn contains(&self, key: &Key) -> bool {
        !self.before_start(key) && !self.past_stop(key)
    }

    fn scan_start(&self) -> Bound<&Key> {
        self.start.as_ref().map_or(Bound::Unbounded, Bound::Included)
    }

    /// The interval as a pair of bounds: the tighter of the endpoint and
    /// every cursor bound on each side.
    fn interval(&self) -> (Bound<Key>, Bound<Key>) {
        let mut lower = self.start.clone().map_or(Bound::Unbounded, Bound::Included);
        let mut upper = self.stop.clone().map_or(Bound::Unbounded, Bound::Included);
        for filter in &self.filters {
            if let Some(b) = filter.lower() {
                lower = tighter(lower, to_bound(b), Ordering::Greater);
            }
            if let Some(b) = filter.upper() {
                upper = tighter(upper, to_bound(b), Ordering::Less);
            }
        }
        (lower, upper)
    }
}

fn to_bound(b: &KeyBound) -> Bound<Key> {
    if b.inclusive {
        Bound::Included(b.key.clone())
    } else {
        Bound::Excluded(b.key.clone())
    }
}

/// Of two bounds on the same side, the one admitting fewer keys. `inward`
/// is the direction a key moves to get deeper into the interval.
fn tighter(a: Bound<Key>, b: Bound<Key>, inward: Ordering) -> Bound<Key> {
    let key = |bound: &Bound<Key>| match bound {
        Bound::Included(k) | Bound::Excluded(k) => Some(k.clone()),
        Bound::Unbounded => None,
    };
    match (key(&a), key(&b)) {
        (None, _) => b,
        (_, None) => a,
        (Some(ka), Some(kb)) => match ka.cmp(&kb) {
            Ordering::Equal if matches!(a, Bound::Excluded(_)) => a,
            Ordering::Equal => b,
            order if order == inward => a,
            _ => b,
        },
    }
}

/// Removes every live record of `range` for the transaction reading
/// through `view`.
pub(crate) fn truncate(
    range: &TruncateRange,
    view: &ReadView,
    writes: &mut TxnWrites,
    stats: &DatabaseStats,
) -> CoreResult<()> {
    let table = range.table();
    let indexes = table.indexes();
    let mut tree = table.tree.write();
    let mut index_trees: Vec<_> = indexes.iter().map(|i| i.tree.write()).collect();
    let (lower, upper) = range.interval();

    // The interval and every record in it must be writable before anything
    // changes.
    tree.check_range(lower.as_ref(), upper.as_ref(), view)?;
    let mut victims: Vec<(Key, Value)> = Vec::new();
    for entry in tree.iter_from(range.scan_start()) {
        if range.before_start(entry.key) {
            continue;
        }
        if range.past_stop(entry.key) {
            break;
        }
        tree.check_write(entry.key, view)?;
        match entry.resolve(view) {
            Resolved::Value(v) => victims.push((entry.key.clone(), v.clone())),
            Resolved::Conflict => {
                return Err(CoreError::rollback_required(format!(
                    "key {} has a prepared update",
                    entry.key
                )))
            }
            Resolved::Tombstone | Resolved::Absent => {}
        }
    }
    let mut index_victims = Vec::new();
    for (pos, (index, index_tree)) in indexes.iter().zip(&index_trees).enumerate() {
        for (key, value) in &victims {
            let entry_key = index.index_entry_key(value, key)?;
            index_tree.check_write(&entry_key, view)?;
            index_victims.push((pos, entry_key));
        }
    }

    let fixed_stop = match table.format() {
        TableFormat::FixedColumn { .. } => range
            .stop
            .as_ref()
            .and_then(Key::as_recno)
            .filter(|stop| *stop > tree.logical_end(view))
            .map(Key::recno),
        _ => None,
    };
    if let Some(stop) = &fixed_stop {
        tree.check_write(stop, view)?;
    }

    // Pages whose records all lie in the interval and are settled history
    // for this transaction are removed whole.
    let mut fast: Vec<(usize, Key, Key)> = Vec::new();
    if matches!(table.format(), TableFormat::Row { .. }) && indexes.is_empty() {
        for (idx, page) in tree.pages().iter().enumerate() {
            let Some((first, last)) = page.key_span() else {
                continue;
            };
            if page.deleted().is_some() || !range.contains(first) || !range.contains(last) {
                continue;
            }
            if !page.entries().all(|(_, chain)| view.sees_all(chain)) {
                continue;
            }
            let has_victim = victims
                .binary_search_by(|(k, _)| k.cmp(first))
                .map_or_else(|i| victims.get(i).map_or(false, |(k, _)| k <= last), |_| true);
            if has_victim {
                fast.push((idx, first.clone(), last.clone()));
            }
        }
    }

    let in_fast_page = |key: &Key| {
        fast.binary_search_by(|(_, first, last)| {
            if last < key {
                Ordering::Less
            } else if first > key {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
        .is_ok()
    };
    // Markers first: page positions are only stable until a write lands.
    for (idx, _, _) in &fast {
        tree.mark_deleted(*idx, view.txn);
    }
    let removed = victims.iter().filter(|(k, _)| !in_fast_page(k)).count();
    for (key, _) in victims.iter().filter(|(k, _)| !in_fast_page(k)) {
        if tree.del(key.clone(), view.txn) {
            stats.record_page_instantiated();
        }
        writes.record(table, key.clone());
    }
    if !fast.is_empty() {
        writes.record_fast_delete(table);
        stats.record_fast_deleted_pages(fast.len() as u64);
    }
    if let Some(stop) = fixed_stop {
        tree.put(
            stop.clone(),
            Version::new(UpdateMeta::uncommitted(view.txn), Payload::Tombstone),
        );
        writes.record(table, stop);
    }
    tree.reserve_range(lower, upper, view.txn);
    writes.record_range(table);
    drop(tree);

    for (pos, entry_key) in index_victims {
        index_trees[pos].del(entry_key.clone(), view.txn);
        writes.record(&indexes[pos], entry_key);
    }
    stats.record_truncate();
    tracing::debug!(
        uri = table.uri(),
        txn = %view.txn,
        removed,
        fast_deleted_pages = fast.len(),
        "truncated range"
    );
    Ok(())
}
