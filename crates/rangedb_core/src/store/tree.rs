//! The ordered, paged, multi-version tree.
//!
//! Pages are kept sorted by their fence keys; page `i` holds the keys from
//! its own fence up to (excluding) the fence of page `i + 1`. A page may
//! carry a fast-delete marker, which every write into the page first turns
//! back into per-record tombstones.
//!
//! An unresolved truncate also leaves a [`RangeReservation`] on the tree, so
//! keys that did not exist when it ran cannot be written into its interval
//! by anyone else until it commits or rolls back.

use super::page::{Page, PageDelete};
use super::version::{Payload, UpdateMeta, Version, VersionChain};
use super::visibility::{globally_visible, ReadView, Resolved};
use crate::error::{CoreError, CoreResult};
use crate::schema::Key;
use crate::types::{Timestamp, TxnId};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Bound, RangeBounds};

/// A record as seen while iterating.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    /// Record key.
    pub key: &'a Key,
    /// Record versions.
    pub chain: &'a VersionChain,
    /// Fast-delete marker of the record's page.
    pub marker: Option<&'a PageDelete>,
}

impl<'a> Entry<'a> {
    /// Resolves the record for a reader.
    #[must_use]
    pub fn resolve(&self, view: &ReadView) -> Resolved<'a> {
        view.resolve(self.chain, self.marker)
    }
}

/// The interval of a truncate that has not resolved yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeReservation {
    /// Lower end of the interval.
    pub lower: Bound<Key>,
    /// Upper end of the interval.
    pub upper: Bound<Key>,
    /// Transaction metadata of the truncate.
    pub meta: UpdateMeta,
}

impl RangeReservation {
    /// Whether `key` lies in the interval.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        (self.lower.as_ref(), self.upper.as_ref()).contains(key)
    }

    /// Whether the interval shares a key with `lower..upper`.
    #[must_use]
    pub fn overlaps(&self, lower: Bound<&Key>, upper: Bound<&Key>) -> bool {
        !ends_before(self.upper.as_ref(), lower) && !ends_before(upper, self.lower.as_ref())
    }
}

/// Whether an interval ending at `upper` lies wholly before one starting
/// at `lower`.
fn ends_before(upper: Bound<&Key>, lower: Bound<&Key>) -> bool {
    match (upper, lower) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
        (Bound::Included(u), Bound::Included(l)) => u < l,
        (Bound::Included(u) | Bound::Excluded(u), Bound::Excluded(l))
        | (Bound::Excluded(u), Bound::Included(l)) => u <= l,
    }
}

/// Paged ordered map from keys to version chains.
#[derive(Debug, Clone)]
pub struct Tree {
    pages: Vec<Page>,
    max_entries: usize,
    reservations: Vec<RangeReservation>,
}

impl Tree {
    /// Creates an empty tree whose pages split above `max_entries` records.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            pages: vec![Page::new(None)],
            max_entries: max_entries.max(2),
            reservations: Vec::new(),
        }
    }

    /// Builds a tree from sorted records, filling pages half way.
    #[must_use]
    pub fn from_records(max_entries: usize, records: BTreeMap<Key, VersionChain>) -> Self {
        let mut tree = Self::new(max_entries);
        let fill = tree.max_entries / 2 + 1;
        let mut current = Page::new(None);
        for (key, chain) in records {
            if current.entries.len() >= fill {
                let next = Page::new(Some(key.clone()));
                tree.pages.push(std::mem::replace(&mut current, next));
            }
            current.entries.insert(key, chain);
        }
        tree.pages.push(current);
        tree.pages.remove(0);
        tree
    }

    /// Pages in key order.
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub(crate) fn pages_mut(&mut self) -> &mut [Page] {
        &mut self.pages
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.iter().map(Page::len).sum()
    }

    /// Whether the tree holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(Page::is_empty)
    }

    fn page_index(&self, key: &Key) -> usize {
        self.pages
            .partition_point(|p| p.lower.as_ref().map_or(true, |l| l <= key))
            .saturating_sub(1)
    }

    fn start_page(&self, start: Bound<&Key>, default: usize) -> usize {
        match start {
            Bound::Included(k) | Bound::Excluded(k) => self.page_index(k),
            Bound::Unbounded => default,
        }
    }

    /// The record stored under `key`, regardless of visibility.
    #[must_use]
    pub fn entry(&self, key: &Key) -> Option<Entry<'_>> {
        let page = &self.pages[self.page_index(key)];
        page.entries.get_key_value(key).map(|(key, chain)| Entry {
            key,
            chain,
            marker: page.deleted.as_ref(),
        })
    }

    /// Resolves `key` for a reader.
    #[must_use]
    pub fn get(&self, key: &Key, view: &ReadView) -> Resolved<'_> {
        self.entry(key)
            .map_or(Resolved::Absent, |entry| entry.resolve(view))
    }

    /// Records in ascending order starting at `start`.
    pub fn iter_from<'a>(&'a self, start: Bound<&'a Key>) -> impl Iterator<Item = Entry<'a>> + 'a {
        let first = self.start_page(start, 0);
        self.pages[first..]
            .iter()
            .enumerate()
            .flat_map(move |(i, page)| {
                let lower = if i == 0 { start } else { Bound::Unbounded };
                let marker = page.deleted.as_ref();
                page.entries
                    .range::<Key, _>((lower, Bound::Unbounded))
                    .map(move |(key, chain)| Entry { key, chain, marker })
            })
    }

    /// Records in descending order starting at `start`.
    pub fn iter_back_from<'a>(
        &'a self,
        start: Bound<&'a Key>,
    ) -> impl Iterator<Item = Entry<'a>> + 'a {
        let last = self.start_page(start, self.pages.len() - 1);
        self.pages[..=last]
            .iter()
            .rev()
            .enumerate()
            .flat_map(move |(i, page)| {
                let upper = if i == 0 { start } else { Bound::Unbounded };
                let marker = page.deleted.as_ref();
                page.entries
                    .range::<Key, _>((Bound::Unbounded, upper))
                    .rev()
                    .map(move |(key, chain)| Entry { key, chain, marker })
            })
    }

    /// The smallest key after (or at, when `inclusive`) `key` with a live
    /// value visible to `view`.
    pub fn first_key_at_or_after(
        &self,
        key: &Key,
        inclusive: bool,
        view: &ReadView,
    ) -> CoreResult<Option<Key>> {
        let start = if inclusive {
            Bound::Included(key)
        } else {
            Bound::Excluded(key)
        };
        first_live(self.iter_from(start), view)
    }

    /// The largest key before (or at, when `inclusive`) `key` with a live
    /// value visible to `view`.
    pub fn last_key_at_or_before(
        &self,
        key: &Key,
        inclusive: bool,
        view: &ReadView,
    ) -> CoreResult<Option<Key>> {
        let start = if inclusive {
            Bound::Included(key)
        } else {
            Bound::Excluded(key)
        };
        first_live(self.iter_back_from(start), view)
    }

    /// The largest key in the tree, ignoring visibility.
    #[must_use]
    pub fn largest_key(&self) -> Option<&Key> {
        self.pages
            .iter()
            .rev()
            .find_map(|p| p.entries.keys().next_back())
    }

    /// The last record number of a column store as seen by `view`.
    ///
    /// Removed records still count; only records with no visible version at
    /// all lie past the end.
    #[must_use]
    pub fn logical_end(&self, view: &ReadView) -> u64 {
        self.iter_back_from(Bound::Unbounded)
            .find(|e| e.resolve(view).is_present())
            .and_then(|e| e.key.as_recno())
            .unwrap_or(0)
    }

    /// Unresolved truncate intervals.
    #[must_use]
    pub fn reservations(&self) -> &[RangeReservation] {
        &self.reservations
    }

    /// Fails with rollback-required if writing `key` would conflict.
    pub fn check_write(&self, key: &Key, view: &ReadView) -> CoreResult<()> {
        if self
            .reservations
            .iter()
            .any(|r| r.contains(key) && view.write_conflicts(&r.meta))
        {
            return Err(CoreError::rollback_required(format!(
                "key {key} lies in a range truncated by a concurrent transaction"
            )));
        }
        let page = &self.pages[self.page_index(key)];
        if let Some(marker) = &page.deleted {
            if view.write_conflicts(&marker.meta) {
                return Err(CoreError::rollback_required(format!(
                    "key {key} lies in a page truncated by a concurrent transaction"
                )));
            }
        }
        if let Some(newest) = page.entries.get(key).and_then(VersionChain::newest) {
            if view.write_conflicts(&newest.meta) {
                return Err(CoreError::rollback_required(format!(
                    "key {key} was written by a concurrent transaction"
                )));
            }
        }
        Ok(())
    }

    /// Fails with rollback-required if `lower..upper` overlaps the interval
    /// of another transaction's unresolved truncate.
    pub fn check_range(
        &self,
        lower: Bound<&Key>,
        upper: Bound<&Key>,
        view: &ReadView,
    ) -> CoreResult<()> {
        if self
            .reservations
            .iter()
            .any(|r| r.overlaps(lower, upper) && view.write_conflicts(&r.meta))
        {
            return Err(CoreError::rollback_required(
                "range overlaps a truncate by a concurrent transaction",
            ));
        }
        Ok(())
    }

    /// Reserves `lower..upper` for the truncate of `txn`.
    pub(crate) fn reserve_range(&mut self, lower: Bound<Key>, upper: Bound<Key>, txn: TxnId) {
        self.reservations.push(RangeReservation {
            lower,
            upper,
            meta: UpdateMeta::uncommitted(txn),
        });
    }

    /// Appends a version. Returns whether a fast-delete marker had to be
    /// instantiated first.
    pub fn put(&mut self, key: Key, version: Version) -> bool {
        let idx = self.page_index(&key);
        let page = &mut self.pages[idx];
        let instantiated = page.instantiate();
        page.entries.entry(key).or_default().push(version);
        if let Some(upper) = page.split_if_needed(self.max_entries) {
            self.pages.insert(idx + 1, upper);
        }
        instantiated
    }

    /// Appends a tombstone written by `txn`.
    pub fn del(&mut self, key: Key, txn: TxnId) -> bool {
        self.put(key, Version::new(UpdateMeta::uncommitted(txn), Payload::Tombstone))
    }

    /// Installs a fast-delete marker on page `idx`.
    pub(crate) fn mark_deleted(&mut self, idx: usize, txn: TxnId) {
        self.pages[idx].deleted = Some(PageDelete {
            meta: UpdateMeta::uncommitted(txn),
        });
    }

    fn each_chain(
        &mut self,
        keys: &BTreeSet<Key>,
        scan_all: bool,
        mut f: impl FnMut(&mut VersionChain),
    ) {
        if scan_all {
            for page in &mut self.pages {
                page.entries.values_mut().for_each(&mut f);
            }
            return;
        }
        for key in keys {
            let idx = self.page_index(key);
            if let Some(chain) = self.pages[idx].entries.get_mut(key) {
                f(chain);
            }
        }
    }

    fn each_marker(&mut self, txn: TxnId, mut f: impl FnMut(&mut UpdateMeta)) {
        for page in &mut self.pages {
            if let Some(marker) = page.deleted.as_mut().filter(|m| m.meta.txn == txn) {
                f(&mut marker.meta);
            }
        }
    }

    /// Moves the versions of `txn` into the prepared state.
    pub(crate) fn prepare_txn(
        &mut self,
        txn: TxnId,
        keys: &BTreeSet<Key>,
        scan_all: bool,
        prepare_ts: Timestamp,
    ) {
        self.each_chain(keys, scan_all, |chain| {
            chain.for_txn(txn, |v| v.meta.prepare(prepare_ts));
        });
        if scan_all {
            self.each_marker(txn, |meta| meta.prepare(prepare_ts));
        }
        for r in self.reservations.iter_mut().filter(|r| r.meta.txn == txn) {
            r.meta.prepare(prepare_ts);
        }
    }

    /// Publishes the versions of `txn`; its reserves are dropped.
    pub(crate) fn commit_txn(
        &mut self,
        txn: TxnId,
        keys: &BTreeSet<Key>,
        scan_all: bool,
        commit_ts: Timestamp,
        durable_ts: Timestamp,
    ) {
        self.each_chain(keys, scan_all, |chain| {
            chain.for_txn(txn, |v| v.meta.commit(commit_ts, durable_ts));
            chain
                .versions_mut()
                .retain(|v| v.meta.txn != txn || !matches!(v.payload, Payload::Reserve));
        });
        if scan_all {
            self.each_marker(txn, |meta| meta.commit(commit_ts, durable_ts));
        }
        self.reservations.retain(|r| r.meta.txn != txn);
        self.drop_empty(keys, scan_all);
    }

    /// Removes every trace of `txn`, restoring fast-deleted pages.
    pub(crate) fn rollback_txn(&mut self, txn: TxnId, keys: &BTreeSet<Key>, scan_all: bool) {
        self.each_chain(keys, scan_all, |chain| chain.discard_txn(txn));
        if scan_all {
            for page in &mut self.pages {
                if page.deleted.map_or(false, |m| m.meta.txn == txn) {
                    page.deleted = None;
                }
            }
        }
        self.reservations.retain(|r| r.meta.txn != txn);
        self.drop_empty(keys, scan_all);
    }

    fn drop_empty(&mut self, keys: &BTreeSet<Key>, scan_all: bool) {
        if scan_all {
            for page in &mut self.pages {
                page.entries.retain(|_, chain| !chain.is_empty());
            }
            return;
        }
        for key in keys {
            let idx = self.page_index(key);
            let page = &mut self.pages[idx];
            if page.entries.get(key).map_or(false, VersionChain::is_empty) {
                page.entries.remove(key);
            }
        }
    }

    /// Discards history no reader can see any more.
    ///
    /// `horizon` is the oldest transaction id that may still be running.
    /// Row stores also drop records whose only remaining version is a
    /// globally visible tombstone; column stores keep them so the table end
    /// does not move. Returns the number of versions discarded.
    pub(crate) fn prune(&mut self, horizon: TxnId, oldest: Timestamp, keep_tombstones: bool) -> usize {
        let mut discarded = 0;
        for page in &mut self.pages {
            if let Some(marker) = page.deleted {
                if globally_visible(&marker.meta, horizon, oldest) {
                    discarded += page.entries.values().map(VersionChain::len).sum::<usize>();
                    page.entries.clear();
                    page.deleted = None;
                    continue;
                }
            }
            page.entries.retain(|_, chain| {
                let versions = chain.versions_mut();
                let floor = versions.iter().rposition(|v| {
                    !matches!(v.payload, Payload::Reserve)
                        && globally_visible(&v.meta, horizon, oldest)
                });
                if let Some(floor) = floor {
                    discarded += floor;
                    versions.drain(..floor);
                    if !keep_tombstones && versions.len() == 1 && versions[0].is_tombstone() {
                        discarded += 1;
                        return false;
                    }
                }
                true
            });
        }
        discarded
    }

    /// Removes committed versions and markers that are not durable at
    /// `stable`. Returns the number removed.
    pub(crate) fn rollback_to_stable(&mut self, stable: Timestamp) -> usize {
        let unstable = |meta: &UpdateMeta| {
            meta.is_committed() && !meta.durable_ts.is_none() && meta.durable_ts > stable
        };
        let mut removed = 0;
        for page in &mut self.pages {
            if page.deleted.map_or(false, |m| unstable(&m.meta)) {
                page.deleted = None;
                removed += 1;
            }
            page.entries.retain(|_, chain| {
                let before = chain.len();
                chain.versions_mut().retain(|v| !unstable(&v.meta));
                removed += before - chain.len();
                !chain.is_empty()
            });
        }
        removed
    }

    /// Whether any version or marker is unresolved.
    #[must_use]
    pub fn has_unresolved(&self) -> bool {
        !self.reservations.is_empty()
            || self.pages.iter().any(|p| {
                p.deleted.map_or(false, |m| !m.meta.is_committed())
                    || p.entries.values().any(VersionChain::has_unresolved)
            })
    }
}

fn first_live<'a>(
    mut entries: impl Iterator<Item = Entry<'a>>,
    view: &ReadView,
) -> CoreResult<Option<Key>> {
    entries
        .find_map(|e| match e.resolve(view) {
            Resolved::Value(_) => Some(Ok(e.key.clone())),
            Resolved::Conflict => Some(Err(CoreError::PrepareConflict)),
            Resolved::Tombstone | Resolved::Absent => None,
        })
        .transpose()
}
