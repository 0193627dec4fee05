//! Cursors over tables, indexes and checkpoints.
//!
//! A cursor stages a key (and value) with [`Cursor::set_key`] and
//! [`Cursor::set_value`], then searches, navigates or writes. Bounds
//! installed with [`Cursor::bound`] restrict every one of those operations
//! to a key interval; they survive [`Cursor::reset`] and disappear with the
//! cursor.

mod bounds;

pub use bounds::{Bounds, KeyBound};

use crate::config::{BoundAction, BoundConfig, CursorConfig, TableKind};
use crate::error::{CoreError, CoreResult};
use crate::schema::{normalize_prefix, Key, Modify, Value};
use crate::session::Session;
use crate::stats::{CursorOp, DatabaseStats};
use crate::store::{ReadView, Resolved, Table, Tree, WriteOp};
use rand::seq::IteratorRandom;
use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::Arc;

/// Where a cursor stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Not positioned; navigation starts at the range end.
    Unset,
    /// On a record.
    At(Key),
    /// Ran off the end of the range; navigation restarts at the range end.
    Exhausted,
}

/// A record found by a scan.
type Found = Option<(Key, Value)>;

/// A cursor owned by one session.
pub struct Cursor<'s> {
    session: &'s Session,
    table: Arc<Table>,
    config: CursorConfig,
    /// Number of index columns when the cursor reads an index.
    index_columns: Option<usize>,
    /// Fixed view of a checkpoint cursor.
    checkpoint: Option<ReadView>,
    bounds: Bounds,
    position: Position,
    key: Option<Key>,
    value: Option<Value>,
    current: Option<Value>,
    poisoned: bool,
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("uri", &self.table.uri())
            .field("bounds", &self.bounds)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl<'s> Cursor<'s> {
    pub(crate) fn new(
        session: &'s Session,
        table: Arc<Table>,
        config: CursorConfig,
        checkpoint: Option<ReadView>,
    ) -> CoreResult<Self> {
        if config.append && !table.format().is_column_store() {
            return Err(CoreError::invalid_argument(
                "append cursors need a column store",
            ));
        }
        let index_columns = table.index_def().map(|def| def.fields.len());
        let bounds = if index_columns.is_some() {
            Bounds::prefix()
        } else {
            Bounds::new()
        };
        table.cursor_opened();
        Ok(Self {
            session,
            table,
            config,
            index_columns,
            checkpoint,
            bounds,
            position: Position::Unset,
            key: None,
            value: None,
            current: None,
            poisoned: false,
        })
    }

    /// URI of the underlying table or index.
    #[must_use]
    pub fn uri(&self) -> &str {
        self.table.uri()
    }

    /// Active bounds.
    #[must_use]
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Whether the cursor reads a checkpoint.
    #[must_use]
    pub fn is_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    pub(crate) fn table(&self) -> &Arc<Table> {
        &self.table
    }

    fn stats(&self) -> &DatabaseStats {
        &self.session.engine().stats
    }

    /// Stages the key for the next operation.
    pub fn set_key(&mut self, key: impl Into<Key>) {
        self.key = Some(key.into());
    }

    /// Stages the value for the next write.
    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = Some(value.into());
    }

    /// Key of the current record, in the caller's form.
    pub fn key(&self) -> CoreResult<Key> {
        match &self.position {
            Position::At(key) => Ok(self.present(key)),
            _ => Err(CoreError::invalid_argument("cursor is not positioned")),
        }
    }

    /// Value of the current record.
    pub fn value(&self) -> CoreResult<Value> {
        match (&self.position, &self.current) {
            (Position::At(_), Some(value)) => Ok(value.clone()),
            (Position::At(_), None) => Err(CoreError::NotFound),
            _ => Err(CoreError::invalid_argument("cursor is not positioned")),
        }
    }

    fn present(&self, key: &Key) -> Key {
        let key = self.table.format().present_key(key);
        match (self.index_columns, key) {
            (Some(1), Key::Composite(mut fields)) if !fields.is_empty() => fields.swap_remove(0),
            (Some(n), Key::Composite(mut fields)) => {
                fields.truncate(n);
                Key::Composite(fields)
            }
            (_, key) => key,
        }
    }

    /// Normalizes the staged key; index cursors take the index columns only.
    fn staged_key(&self) -> CoreResult<Key> {
        let key = self
            .key
            .clone()
            .ok_or_else(|| CoreError::invalid_argument("no key has been set"))?;
        match self.table.index_def() {
            Some(def) => normalize_prefix(&def.fields, key),
            None => self.table.format().normalize_key(key),
        }
    }

    fn staged_value(&self) -> CoreResult<Value> {
        let value = self
            .value
            .clone()
            .ok_or_else(|| CoreError::invalid_argument("no value has been set"))?;
        self.table.format().normalize_value(value)
    }

    fn check_usable(&self) -> CoreResult<()> {
        if self.poisoned {
            return Err(CoreError::invalid_argument(
                "cursor must be reset after a rollback-required error",
            ));
        }
        Ok(())
    }

    fn check_ordered(&self, operation: &str) -> CoreResult<()> {
        if self.config.next_random {
            return Err(CoreError::not_supported(format!(
                "{operation} is not supported on random cursors"
            )));
        }
        Ok(())
    }

    fn check_writable(&self) -> CoreResult<()> {
        self.check_usable()?;
        self.check_ordered("writing")?;
        if self.checkpoint.is_some() {
            return Err(CoreError::not_supported("checkpoint cursors are read-only"));
        }
        if self.index_columns.is_some() {
            return Err(CoreError::not_supported("index cursors are read-only"));
        }
        Ok(())
    }

    fn view(&self) -> CoreResult<ReadView> {
        match &self.checkpoint {
            Some(view) => Ok(view.clone()),
            None => self.session.read_view(),
        }
    }

    /// Remembers a failed operation; conflicts poison the cursor.
    fn fail<T>(&mut self, err: CoreError) -> CoreResult<T> {
        if err.requires_rollback() {
            self.poisoned = true;
        }
        Err(err)
    }

    fn settle(&mut self, found: CoreResult<Found>) -> CoreResult<()> {
        match found {
            Ok(Some((key, value))) => {
                self.position = Position::At(key);
                self.current = Some(value);
                Ok(())
            }
            Ok(None) => {
                self.position = Position::Exhausted;
                self.current = None;
                Err(CoreError::NotFound)
            }
            Err(err) => self.fail(err),
        }
    }

    fn conflict(&self) -> CoreError {
        self.stats().record_prepare_conflict();
        CoreError::PrepareConflict
    }

    // --- scans -------------------------------------------------------------

    /// First live in-range record at or after `start`.
    fn scan_forward(&self, tree: &Tree, view: &ReadView, start: Bound<&Key>) -> CoreResult<Found> {
        if self.table.format().is_fixed_column() {
            let from = match start {
                Bound::Included(k) => k.as_recno(),
                Bound::Excluded(k) => k.as_recno().and_then(|r| r.checked_add(1)),
                Bound::Unbounded => Some(1),
            };
            return self.fixed_forward(tree, view, from);
        }
        for entry in tree.iter_from(start) {
            if self.bounds.below_lower(entry.key) {
                continue;
            }
            if self.bounds.above_upper(entry.key) {
                self.stats().record_next_early_exit();
                return Ok(None);
            }
            match entry.resolve(view) {
                Resolved::Value(v) => return Ok(Some((entry.key.clone(), v.clone()))),
                Resolved::Conflict => return Err(self.conflict()),
                Resolved::Tombstone | Resolved::Absent => {}
            }
        }
        Ok(None)
    }

    /// Last live in-range record at or before `start`.
    fn scan_backward(&self, tree: &Tree, view: &ReadView, start: Bound<&Key>) -> CoreResult<Found> {
        if self.table.format().is_fixed_column() {
            let from = match start {
                Bound::Included(k) => k.as_recno(),
                Bound::Excluded(k) => k.as_recno().map(|r| r.saturating_sub(1)),
                Bound::Unbounded => Some(u64::MAX),
            };
            return self.fixed_backward(tree, view, from);
        }
        for entry in tree.iter_back_from(start) {
            if self.bounds.above_upper(entry.key) {
                continue;
            }
            if self.bounds.below_lower(entry.key) {
                self.stats().record_prev_early_exit();
                return Ok(None);
            }
            match entry.resolve(view) {
                Resolved::Value(v) => return Ok(Some((entry.key.clone(), v.clone()))),
                Resolved::Conflict => return Err(self.conflict()),
                Resolved::Tombstone | Resolved::Absent => {}
            }
        }
        Ok(None)
    }

    /// Reads one record of a fixed-length column store. Every record up to
    /// the table end exists; removed ones read as zero.
    fn fixed_read(&self, tree: &Tree, view: &ReadView, recno: u64) -> CoreResult<Value> {
        match tree.get(&Key::recno(recno), view) {
            Resolved::Value(v) => Ok(v.clone()),
            Resolved::Conflict => Err(self.conflict()),
            Resolved::Tombstone | Resolved::Absent => Ok(Value::Bits(0)),
        }
    }

    fn fixed_forward(&self, tree: &Tree, view: &ReadView, from: Option<u64>) -> CoreResult<Found> {
        let end = tree.logical_end(view);
        let Some(mut recno) = from.map(|r| r.max(1)) else {
            return Ok(None);
        };
        if let Some(lower) = self.bounds.lower().and_then(|b| {
            let r = b.key.as_recno()?;
            if b.inclusive {
                Some(r)
            } else {
                r.checked_add(1)
            }
        }) {
            recno = recno.max(lower);
        } else if self.bounds.lower().is_some() {
            // Exclusive lower bound at the top of the record space.
            return Ok(None);
        }
        if recno > end {
            return Ok(None);
        }
        let key = Key::recno(recno);
        if self.bounds.above_upper(&key) {
            self.stats().record_next_early_exit();
            return Ok(None);
        }
        let value = self.fixed_read(tree, view, recno)?;
        Ok(Some((key, value)))
    }

    fn fixed_backward(&self, tree: &Tree, view: &ReadView, from: Option<u64>) -> CoreResult<Found> {
        let end = tree.logical_end(view);
        let mut recno = from.unwrap_or(0).min(end);
        if let Some(upper) = self.bounds.upper() {
            let r = upper.key.as_recno().unwrap_or(0);
            let limit = if upper.inclusive { r } else { r.saturating_sub(1) };
            recno = recno.min(limit);
        }
        if recno == 0 {
            return Ok(None);
        }
        let key = Key::recno(recno);
        if self.bounds.below_lower(&key) {
            self.stats().record_prev_early_exit();
            return Ok(None);
        }
        let value = self.fixed_read(tree, view, recno)?;
        Ok(Some((key, value)))
    }

    /// The record matching `key` exactly (by index columns for indexes).
    fn exact(&self, tree: &Tree, view: &ReadView, key: &Key) -> CoreResult<Found> {
        if self.table.format().is_fixed_column() {
            let recno = key.as_recno().unwrap_or(0);
            if recno == 0 || recno > tree.logical_end(view) {
                return Ok(None);
            }
            return Ok(Some((key.clone(), self.fixed_read(tree, view, recno)?)));
        }
        if self.index_columns.is_some() {
            for entry in tree.iter_from(Bound::Included(key)) {
                if entry.key.cmp_prefix(key) != Ordering::Equal {
                    return Ok(None);
                }
                match entry.resolve(view) {
                    Resolved::Value(v) => return Ok(Some((entry.key.clone(), v.clone()))),
                    Resolved::Conflict => return Err(self.conflict()),
                    Resolved::Tombstone | Resolved::Absent => {}
                }
            }
            return Ok(None);
        }
        match tree.get(key, view) {
            Resolved::Value(v) => Ok(Some((key.clone(), v.clone()))),
            Resolved::Conflict => Err(self.conflict()),
            Resolved::Tombstone | Resolved::Absent => Ok(None),
        }
    }

    // --- navigation --------------------------------------------------------

    /// Moves to the next record in range.
    pub fn next(&mut self) -> CoreResult<()> {
        self.check_usable()?;
        self.stats().record_cursor_op(CursorOp::Next);
        if self.config.next_random {
            return self.next_random();
        }
        let view = self.view()?;
        let from = match &self.position {
            Position::At(key) => Some(key.clone()),
            Position::Unset | Position::Exhausted => None,
        };
        let found = {
            let tree = self.table.tree.read();
            let start = from
                .as_ref()
                .map_or_else(|| self.bounds.forward_start(), Bound::Excluded);
            self.scan_forward(&tree, &view, start)
        };
        self.settle(found)
    }

    /// Moves to the previous record in range.
    pub fn prev(&mut self) -> CoreResult<()> {
        self.check_usable()?;
        self.check_ordered("prev")?;
        self.stats().record_cursor_op(CursorOp::Prev);
        let view = self.view()?;
        let from = match &self.position {
            Position::At(key) => Some(key.clone()),
            Position::Unset | Position::Exhausted => None,
        };
        let found = {
            let tree = self.table.tree.read();
            let start = from
                .as_ref()
                .map_or_else(|| self.bounds.backward_start(), Bound::Excluded);
            self.scan_backward(&tree, &view, start)
        };
        self.settle(found)
    }

    fn next_random(&mut self) -> CoreResult<()> {
        let view = self.view()?;
        let picked = {
            let tree = self.table.tree.read();
            let mut live = Vec::new();
            let mut blocked = false;
            for entry in tree.iter_from(Bound::Unbounded) {
                match entry.resolve(&view) {
                    Resolved::Value(v) => live.push((entry.key.clone(), v.clone())),
                    Resolved::Conflict => blocked = true,
                    Resolved::Tombstone | Resolved::Absent => {}
                }
            }
            if blocked && live.is_empty() {
                Err(self.conflict())
            } else {
                Ok(live.into_iter().choose(&mut rand::thread_rng()))
            }
        };
        match picked {
            Ok(Some((key, value))) => {
                self.position = Position::At(key);
                self.current = Some(value);
                Ok(())
            }
            Ok(None) => Err(CoreError::NotFound),
            Err(err) => self.fail(err),
        }
    }

    /// Positions on the staged key.
    ///
    /// A key outside the bounds is not found without looking at the table.
    pub fn search(&mut self) -> CoreResult<()> {
        self.check_usable()?;
        self.check_ordered("search")?;
        self.stats().record_cursor_op(CursorOp::Search);
        let key = self.staged_key()?;
        if !self.bounds.admits(&key) {
            self.stats().record_search_early_exit();
            return Err(CoreError::NotFound);
        }
        let view = self.view()?;
        let found = {
            let tree = self.table.tree.read();
            self.exact(&tree, &view, &key)
        };
        match found {
            Ok(Some((key, value))) => {
                self.position = Position::At(key);
                self.current = Some(value);
                self.key = None;
                Ok(())
            }
            Ok(None) => Err(CoreError::NotFound),
            Err(err) => self.fail(err),
        }
    }

    /// Positions on the staged key or its nearest in-range neighbour.
    ///
    /// Returns how the found key compares with the staged one. A staged key
    /// below the lower bound lands on the first key in range (`Greater`),
    /// one past the upper bound on the last key in range (`Less`).
    pub fn search_near(&mut self) -> CoreResult<Ordering> {
        self.check_usable()?;
        self.check_ordered("search_near")?;
        self.stats().record_cursor_op(CursorOp::SearchNear);
        let key = self.staged_key()?;
        let view = self.view()?;
        let result = {
            let tree = self.table.tree.read();
            self.near(&tree, &view, &key)
        };
        match result {
            Ok(Some((found, value, order))) => {
                self.position = Position::At(found);
                self.current = Some(value);
                self.key = None;
                Ok(order)
            }
            Ok(None) => Err(CoreError::NotFound),
            Err(err) => self.fail(err),
        }
    }

    fn near(
        &self,
        tree: &Tree,
        view: &ReadView,
        key: &Key,
    ) -> CoreResult<Option<(Key, Value, Ordering)>> {
        if self.bounds.below_lower(key) {
            self.stats().record_search_near_repositioned();
            return Ok(self
                .scan_forward(tree, view, self.bounds.forward_start())?
                .map(|(k, v)| (k, v, Ordering::Greater)));
        }
        if self.bounds.above_upper(key) {
            self.stats().record_search_near_repositioned();
            return Ok(self
                .scan_backward(tree, view, self.bounds.backward_start())?
                .map(|(k, v)| (k, v, Ordering::Less)));
        }
        if let Some((k, v)) = self.exact(tree, view, key)? {
            return Ok(Some((k, v, Ordering::Equal)));
        }
        if let Some((k, v)) = self.scan_forward(tree, view, Bound::Excluded(key))? {
            // An index prefix sorts before its entries, so a later entry may
            // still share the prefix; it was ruled out by `exact` above.
            return Ok(Some((k, v, Ordering::Greater)));
        }
        Ok(self
            .scan_backward(tree, view, Bound::Excluded(key))?
            .map(|(k, v)| (k, v, Ordering::Less)))
    }

    /// Positions on the largest key in the table, visible or not.
    pub fn largest_key(&mut self) -> CoreResult<()> {
        self.check_usable()?;
        self.check_ordered("largest_key")?;
        if self.table.kind() == TableKind::Lsm {
            return Err(CoreError::not_supported("largest_key is not supported on LSM tables"));
        }
        if self.bounds.is_active() {
            return Err(CoreError::not_supported("largest_key is not supported with bounds set"));
        }
        let view = self.view()?;
        let tree = self.table.tree.read();
        let key = tree.largest_key().cloned().ok_or(CoreError::NotFound)?;
        let current = tree.get(&key, &view).value().cloned();
        drop(tree);
        self.position = Position::At(key);
        self.current = current;
        Ok(())
    }

    // --- bounds ------------------------------------------------------------

    /// Sets or clears a bound.
    ///
    /// Setting consumes the staged key. On error the cursor is unchanged.
    pub fn bound(&mut self, config: BoundConfig) -> CoreResult<()> {
        self.check_ordered("bound")?;
        if self.table.kind() == TableKind::Lsm {
            return Err(CoreError::not_supported("bounds are not supported on LSM tables"));
        }
        if self.config.append && self.table.format().is_fixed_column() {
            return Err(CoreError::not_supported(
                "bounds are not supported on fixed-length append cursors",
            ));
        }
        if config.action == BoundAction::Clear {
            self.bounds.clear();
            self.position = Position::Unset;
            self.current = None;
            return Ok(());
        }
        let kind = config
            .bound
            .ok_or_else(|| CoreError::invalid_argument("setting a bound needs lower or upper"))?;
        if matches!(self.position, Position::At(_)) {
            return Err(CoreError::invalid_argument(
                "bounds cannot be set on a positioned cursor",
            ));
        }
        let key = self.staged_key()?;
        self.bounds = self.bounds.with(
            kind,
            KeyBound {
                key,
                inclusive: config.inclusive,
            },
        )?;
        self.key = None;
        Ok(())
    }

    /// Forgets the position and staged data; bounds stay.
    pub fn reset(&mut self) {
        self.position = Position::Unset;
        self.key = None;
        self.value = None;
        self.current = None;
        self.poisoned = false;
    }

    // --- writes ------------------------------------------------------------

    fn write(&mut self, key: Key, op: WriteOp) -> CoreResult<()> {
        self.stats().record_cursor_op(CursorOp::Write);
        if !self.bounds.admits(&key) {
            return Err(CoreError::NotFound);
        }
        let result = self
            .session
            .write(&self.table, key.clone(), op, self.config.overwrite);
        match result {
            Ok(written) => {
                let current = match written {
                    Some(Some(value)) => Some(value),
                    _ => self.table.format().zero_value().filter(|_| key.as_recno().is_some()),
                };
                self.position = Position::At(key);
                self.current = current;
                self.key = None;
                self.value = None;
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    /// Inserts the staged record; append cursors allocate the key.
    pub fn insert(&mut self) -> CoreResult<()> {
        self.check_writable()?;
        let value = self.staged_value()?;
        let key = if self.config.append {
            self.next_recno()?
        } else {
            self.staged_key()?
        };
        self.write(key, WriteOp::Insert(value))
    }

    fn next_recno(&self) -> CoreResult<Key> {
        let tree = self.table.tree.read();
        match tree.largest_key() {
            None => Ok(Key::recno(1)),
            Some(key) => key
                .next_recno()
                .ok_or_else(|| CoreError::invalid_argument("record number space exhausted")),
        }
    }

    /// Updates the staged record.
    pub fn update(&mut self) -> CoreResult<()> {
        self.check_writable()?;
        let key = self.staged_key()?;
        let value = self.staged_value()?;
        self.write(key, WriteOp::Update(value))
    }

    /// Removes the staged (or current) record.
    pub fn remove(&mut self) -> CoreResult<()> {
        self.check_writable()?;
        let key = match (&self.key, &self.position) {
            (None, Position::At(key)) => key.clone(),
            _ => self.staged_key()?,
        };
        self.write(key, WriteOp::Remove)
    }

    /// Locks the staged record for the running transaction without changing it.
    pub fn reserve(&mut self) -> CoreResult<()> {
        self.check_writable()?;
        if !self.session.in_transaction() {
            return Err(CoreError::invalid_argument("reserve requires a running transaction"));
        }
        let key = self.staged_key()?;
        self.write(key, WriteOp::Reserve)
    }

    /// Applies byte-range edits to the staged record.
    pub fn modify(&mut self, mods: &[Modify]) -> CoreResult<()> {
        self.check_writable()?;
        if !self.session.in_transaction() {
            return Err(CoreError::not_supported("modify requires a running transaction"));
        }
        let key = self.staged_key()?;
        self.write(key, WriteOp::Modify(mods.to_vec()))
    }

    /// The key a truncate starting or stopping here uses: the staged key,
    /// else the current one.
    pub(crate) fn endpoint(&self) -> CoreResult<Key> {
        let key = match (&self.key, &self.position) {
            (Some(_), _) => self.staged_key()?,
            (None, Position::At(key)) => key.clone(),
            (None, _) => {
                return Err(CoreError::invalid_argument(
                    "truncate cursors need a key or a position",
                ))
            }
        };
        if !self.bounds.admits(&key) {
            return Err(CoreError::invalid_argument(format!(
                "truncate endpoint {key} lies outside its cursor's bounds"
            )));
        }
        Ok(key)
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.table.cursor_closed();
    }
}
