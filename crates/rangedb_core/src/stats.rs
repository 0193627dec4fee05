//! Database statistics.
//!
//! Counters are relaxed atomics shared by every session; read them through
//! [`DatabaseStats::snapshot`].
//!
//! ```rust,ignore
//! let db = Database::open_in_memory()?;
//! // ... bounded scans ...
//! let stats = db.stats();
//! println!("early exits: {}", stats.bounds_next_early_exit);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine-wide counters.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    cursor_searches: AtomicU64,
    cursor_search_nears: AtomicU64,
    cursor_nexts: AtomicU64,
    cursor_prevs: AtomicU64,
    cursor_writes: AtomicU64,

    bounds_search_early_exit: AtomicU64,
    bounds_search_near_repositioned: AtomicU64,
    bounds_next_early_exit: AtomicU64,
    bounds_prev_early_exit: AtomicU64,

    prepare_conflicts: AtomicU64,
    rollbacks_required: AtomicU64,

    truncates: AtomicU64,
    fast_deleted_pages: AtomicU64,
    pages_instantiated: AtomicU64,
    versions_discarded: AtomicU64,

    transactions_begun: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    transactions_prepared: AtomicU64,

    checkpoints: AtomicU64,
}

/// Which cursor operation to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CursorOp {
    Search,
    SearchNear,
    Next,
    Prev,
    Write,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl DatabaseStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cursor_op(&self, op: CursorOp) {
        bump(match op {
            CursorOp::Search => &self.cursor_searches,
            CursorOp::SearchNear => &self.cursor_search_nears,
            CursorOp::Next => &self.cursor_nexts,
            CursorOp::Prev => &self.cursor_prevs,
            CursorOp::Write => &self.cursor_writes,
        });
    }

    pub(crate) fn record_search_early_exit(&self) {
        bump(&self.bounds_search_early_exit);
    }

    pub(crate) fn record_search_near_repositioned(&self) {
        bump(&self.bounds_search_near_repositioned);
    }

    pub(crate) fn record_next_early_exit(&self) {
        bump(&self.bounds_next_early_exit);
    }

    pub(crate) fn record_prev_early_exit(&self) {
        bump(&self.bounds_prev_early_exit);
    }

    pub(crate) fn record_prepare_conflict(&self) {
        bump(&self.prepare_conflicts);
    }

    pub(crate) fn record_rollback_required(&self) {
        bump(&self.rollbacks_required);
    }

    pub(crate) fn record_truncate(&self) {
        bump(&self.truncates);
    }

    pub(crate) fn record_fast_deleted_pages(&self, pages: u64) {
        self.fast_deleted_pages.fetch_add(pages, Ordering::Relaxed);
    }

    pub(crate) fn record_page_instantiated(&self) {
        bump(&self.pages_instantiated);
    }

    pub(crate) fn record_versions_discarded(&self, versions: u64) {
        self.versions_discarded.fetch_add(versions, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_begin(&self) {
        bump(&self.transactions_begun);
    }

    pub(crate) fn record_transaction_commit(&self) {
        bump(&self.transactions_committed);
    }

    pub(crate) fn record_transaction_rollback(&self) {
        bump(&self.transactions_rolled_back);
    }

    pub(crate) fn record_transaction_prepare(&self) {
        bump(&self.transactions_prepared);
    }

    pub(crate) fn record_checkpoint(&self) {
        bump(&self.checkpoints);
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            cursor_searches: load(&self.cursor_searches),
            cursor_search_nears: load(&self.cursor_search_nears),
            cursor_nexts: load(&self.cursor_nexts),
            cursor_prevs: load(&self.cursor_prevs),
            cursor_writes: load(&self.cursor_writes),
            bounds_search_early_exit: load(&self.bounds_search_early_exit),
            bounds_search_near_repositioned: load(&self.bounds_search_near_repositioned),
            bounds_next_early_exit: load(&self.bounds_next_early_exit),
            bounds_prev_early_exit: load(&self.bounds_prev_early_exit),
            prepare_conflicts: load(&self.prepare_conflicts),
            rollbacks_required: load(&self.rollbacks_required),
            truncates: load(&self.truncates),
            fast_deleted_pages: load(&self.fast_deleted_pages),
            pages_instantiated: load(&self.pages_instantiated),
            versions_discarded: load(&self.versions_discarded),
            transactions_begun: load(&self.transactions_begun),
            transactions_committed: load(&self.transactions_committed),
            transactions_rolled_back: load(&self.transactions_rolled_back),
            transactions_prepared: load(&self.transactions_prepared),
            checkpoints: load(&self.checkpoints),
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`].
///
/// Unlike `DatabaseStats`, this is a plain struct that can be serialized,
/// compared, or passed across threads without atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// `search` calls.
    pub cursor_searches: u64,
    /// `search_near` calls.
    pub cursor_search_nears: u64,
    /// `next` calls.
    pub cursor_nexts: u64,
    /// `prev` calls.
    pub cursor_prevs: u64,
    /// Cursor mutations.
    pub cursor_writes: u64,
    /// Searches answered without touching the tree because the key was out of bounds.
    pub bounds_search_early_exit: u64,
    /// `search_near` calls moved to a bound because the key was out of bounds.
    pub bounds_search_near_repositioned: u64,
    /// Forward scans stopped at the upper bound.
    pub bounds_next_early_exit: u64,
    /// Backward scans stopped at the lower bound.
    pub bounds_prev_early_exit: u64,
    /// Reads that hit a prepared update.
    pub prepare_conflicts: u64,
    /// Writes and truncates that failed with rollback-required.
    pub rollbacks_required: u64,
    /// Range truncates applied.
    pub truncates: u64,
    /// Pages deleted without instantiating their records.
    pub fast_deleted_pages: u64,
    /// Fast-deleted pages turned back into per-record tombstones.
    pub pages_instantiated: u64,
    /// Versions discarded by obsolete-history cleanup.
    pub versions_discarded: u64,
    /// Transactions begun.
    pub transactions_begun: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions rolled back.
    pub transactions_rolled_back: u64,
    /// Transactions prepared.
    pub transactions_prepared: u64,
    /// Checkpoints taken.
    pub checkpoints: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(DatabaseStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn snapshot_reflects_increments() {
        let stats = DatabaseStats::new();
        stats.record_cursor_op(CursorOp::Next);
        stats.record_cursor_op(CursorOp::Next);
        stats.record_next_early_exit();
        stats.record_fast_deleted_pages(3);
        stats.record_transaction_prepare();

        let snap = stats.snapshot();
        assert_eq!(snap.cursor_nexts, 2);
        assert_eq!(snap.bounds_next_early_exit, 1);
        assert_eq!(snap.fast_deleted_pages, 3);
        assert_eq!(snap.transactions_prepared, 1);
        assert_eq!(snap.cursor_prevs, 0);
    }

    #[test]
    fn snapshot_serializes() {
        let stats = DatabaseStats::new();
        stats.record_checkpoint();
        let snap = stats.snapshot();
        let mut buf = Vec::new();
        ciborium::into_writer(&snap, &mut buf).unwrap();
        assert!(!buf.is_empty());
    }
}
