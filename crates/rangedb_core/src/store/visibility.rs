//! Visibility of versions to readers and writers.
//!
//! A committed version is visible when its transaction finished before the
//! reader's snapshot and its commit timestamp is not after the reader's read
//! timestamp. Versions of prepared transactions are judged by timestamp
//! alone: while unresolved they conflict with any reader whose frontier
//! reaches the prepare timestamp, and once committed they are visible to any
//! reader at or after their commit timestamp.

use super::page::PageDelete;
use super::version::{Payload, UpdateMeta, UpdateState, VersionChain};
use crate::schema::Value;
use crate::txn::Snapshot;
use crate::types::{Timestamp, TxnId};

/// Verdict on a single update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The reader sees the update.
    Visible,
    /// The reader skips the update.
    Invisible,
    /// The update is prepared and unresolved for this reader.
    Conflict,
}

/// What a reader observes for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    /// A live value.
    Value(&'a Value),
    /// The newest visible version is a removal.
    Tombstone,
    /// No version is visible.
    Absent,
    /// A prepared version blocks the read.
    Conflict,
}

impl<'a> Resolved<'a> {
    /// The value, if live.
    #[must_use]
    pub const fn value(self) -> Option<&'a Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Whether some version (live, removed or blocked) is present.
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// The visibility frontier of one read.
#[derive(Debug, Clone)]
pub struct ReadView {
    /// Reading transaction; its own writes are always visible.
    pub txn: TxnId,
    /// Finished transactions at snapshot time.
    pub snapshot: Snapshot,
    /// Read timestamp, or none for "latest".
    pub read_ts: Timestamp,
    /// Skip prepared versions instead of conflicting.
    pub ignore_prepare: bool,
}

impl ReadView {
    /// A view over everything committed, with no timestamp.
    #[must_use]
    pub fn latest() -> Self {
        Self {
            txn: TxnId::NONE,
            snapshot: Snapshot::all(),
            read_ts: Timestamp::NONE,
            ignore_prepare: false,
        }
    }

    /// Judges one update.
    #[must_use]
    pub fn judge(&self, meta: &UpdateMeta) -> Visibility {
        if self.txn != TxnId::NONE && meta.txn == self.txn {
            return Visibility::Visible;
        }
        match meta.state {
            UpdateState::Uncommitted => Visibility::Invisible,
            UpdateState::Prepared => {
                if self.ignore_prepare {
                    Visibility::Invisible
                } else if self.read_ts.is_none() || meta.prepare_ts <= self.read_ts {
                    Visibility::Conflict
                } else {
                    Visibility::Invisible
                }
            }
            UpdateState::Committed => {
                let id_visible = meta.was_prepared || self.snapshot.sees(meta.txn);
                let ts_visible = self.read_ts.is_none()
                    || meta.commit_ts.is_none()
                    || meta.commit_ts <= self.read_ts;
                if id_visible && ts_visible {
                    Visibility::Visible
                } else {
                    Visibility::Invisible
                }
            }
        }
    }

    /// Resolves a key from its chain and the page-delete marker covering it.
    #[must_use]
    pub fn resolve<'a>(&self, chain: &'a VersionChain, marker: Option<&PageDelete>) -> Resolved<'a> {
        if let Some(marker) = marker {
            match self.judge(&marker.meta) {
                Visibility::Visible => return Resolved::Tombstone,
                Visibility::Conflict => return Resolved::Conflict,
                Visibility::Invisible => {}
            }
        }
        for version in chain.newest_first() {
            if matches!(version.payload, Payload::Reserve) {
                continue;
            }
            match self.judge(&version.meta) {
                Visibility::Visible => {
                    return match &version.payload {
                        Payload::Value(v) => Resolved::Value(v),
                        _ => Resolved::Tombstone,
                    }
                }
                Visibility::Conflict => return Resolved::Conflict,
                Visibility::Invisible => {}
            }
        }
        Resolved::Absent
    }

    /// Whether writing over `meta` conflicts with this (writing) view.
    ///
    /// First writer wins: any unresolved update of another transaction, or a
    /// committed one outside the writer's snapshot, is a conflict.
    #[must_use]
    pub fn write_conflicts(&self, meta: &UpdateMeta) -> bool {
        if meta.txn == self.txn && self.txn != TxnId::NONE {
            return false;
        }
        match meta.state {
            UpdateState::Uncommitted | UpdateState::Prepared => true,
            UpdateState::Committed => !self.snapshot.sees(meta.txn),
        }
    }

    /// Whether every version of the chain is committed and visible to this view.
    #[must_use]
    pub fn sees_all(&self, chain: &VersionChain) -> bool {
        chain
            .versions()
            .iter()
            .all(|v| v.meta.is_committed() && self.judge(&v.meta) == Visibility::Visible)
    }
}

/// Whether an update can be seen by every possible reader.
///
/// Such an update hides everything older in its chain, so the older
/// versions can be discarded.
#[must_use]
pub fn globally_visible(meta: &UpdateMeta, horizon: TxnId, oldest: Timestamp) -> bool {
    meta.is_committed()
        && (meta.was_prepared || meta.txn == TxnId::NONE || meta.txn < horizon)
        && meta.commit_ts <= oldest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::version::Version;

    fn view(txn: u64, read_ts: u64) -> ReadView {
        ReadView {
            txn: TxnId::new(txn),
            snapshot: Snapshot::new(TxnId::new(txn), vec![TxnId::new(5)]),
            read_ts: Timestamp::new(read_ts),
            ignore_prepare: false,
        }
    }

    fn committed_by(txn: u64, ts: u64) -> UpdateMeta {
        let mut meta = UpdateMeta::uncommitted(TxnId::new(txn));
        meta.commit(Timestamp::new(ts), Timestamp::new(ts));
        meta
    }

    #[test]
    fn newest_visible_version_wins() {
        let mut chain = VersionChain::new();
        chain.push(Version::new(committed_by(1, 10), Payload::Value(Value::str("v1"))));
        chain.push(Version::new(committed_by(2, 20), Payload::Value(Value::str("v2"))));
        chain.push(Version::new(committed_by(3, 30), Payload::Tombstone));

        assert_eq!(view(9, 15).resolve(&chain, None), Resolved::Value(&Value::str("v1")));
        assert_eq!(view(9, 25).resolve(&chain, None), Resolved::Value(&Value::str("v2")));
        assert_eq!(view(9, 35).resolve(&chain, None), Resolved::Tombstone);
        assert_eq!(view(9, 5).resolve(&chain, None), Resolved::Absent);
        assert_eq!(view(9, 0).resolve(&chain, None), Resolved::Tombstone);
    }

    #[test]
    fn snapshot_hides_concurrent_commits() {
        let r = view(9, 0);
        assert_eq!(r.judge(&committed_by(5, 1)), Visibility::Invisible);
        assert_eq!(r.judge(&committed_by(4, 1)), Visibility::Visible);
        assert_eq!(r.judge(&committed_by(12, 1)), Visibility::Invisible);
    }

    #[test]
    fn own_and_foreign_uncommitted() {
        let r = view(9, 0);
        assert_eq!(r.judge(&UpdateMeta::uncommitted(TxnId::new(9))), Visibility::Visible);
        assert_eq!(r.judge(&UpdateMeta::uncommitted(TxnId::new(8))), Visibility::Invisible);
        assert!(r.write_conflicts(&UpdateMeta::uncommitted(TxnId::new(8))));
        assert!(!r.write_conflicts(&UpdateMeta::uncommitted(TxnId::new(9))));
        assert!(r.write_conflicts(&committed_by(5, 1)));
        assert!(!r.write_conflicts(&committed_by(4, 1)));
    }

    #[test]
    fn prepared_versions_conflict_at_or_after_prepare() {
        let mut meta = UpdateMeta::uncommitted(TxnId::new(5));
        meta.prepare(Timestamp::new(20));
        assert_eq!(view(9, 0).judge(&meta), Visibility::Conflict);
        assert_eq!(view(9, 20).judge(&meta), Visibility::Conflict);
        assert_eq!(view(9, 19).judge(&meta), Visibility::Invisible);

        let mut ignoring = view(9, 0);
        ignoring.ignore_prepare = true;
        assert_eq!(ignoring.judge(&meta), Visibility::Invisible);
    }

    #[test]
    fn prepared_commit_is_judged_by_timestamp() {
        let mut meta = UpdateMeta::uncommitted(TxnId::new(5));
        meta.prepare(Timestamp::new(5));
        meta.commit(Timestamp::new(6), Timestamp::new(6));
        // txn 5 is in the reader's concurrent set, yet the commit is visible.
        assert_eq!(view(9, 0).judge(&meta), Visibility::Visible);
        assert_eq!(view(9, 6).judge(&meta), Visibility::Visible);
        assert_eq!(view(9, 5).judge(&meta), Visibility::Invisible);
    }

    #[test]
    fn marker_acts_as_newest_tombstone() {
        let mut chain = VersionChain::new();
        chain.push(Version::new(committed_by(1, 10), Payload::Value(Value::str("v1"))));
        let marker = PageDelete {
            meta: UpdateMeta::uncommitted(TxnId::new(7)),
        };
        assert_eq!(view(7, 0).resolve(&chain, Some(&marker)), Resolved::Tombstone);
        assert_eq!(
            view(9, 0).resolve(&chain, Some(&marker)),
            Resolved::Value(&Value::str("v1"))
        );
    }

    #[test]
    fn reserves_are_skipped() {
        let mut chain = VersionChain::new();
        chain.push(Version::new(committed_by(1, 10), Payload::Value(Value::str("v1"))));
        chain.push(Version::new(UpdateMeta::uncommitted(TxnId::new(9)), Payload::Reserve));
        assert_eq!(view(9, 0).resolve(&chain, None), Resolved::Value(&Value::str("v1")));
    }

    #[test]
    fn global_visibility_needs_oldest() {
        let meta = committed_by(1, 10);
        assert!(globally_visible(&meta, TxnId::new(2), Timestamp::new(10)));
        assert!(!globally_visible(&meta, TxnId::new(2), Timestamp::new(9)));
        assert!(!globally_visible(&meta, TxnId::new(1), Timestamp::new(10)));
        let untimed = committed_by(1, 0);
        assert!(globally_visible(&untimed, TxnId::new(2), Timestamp::NONE));
    }
}
