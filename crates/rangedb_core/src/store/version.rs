//! Per-record version chains.

use crate::schema::Value;
use crate::types::{Timestamp, TxnId};
use serde::{Deserialize, Serialize};

/// Resolution state of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateState {
    /// Written by a running transaction.
    Uncommitted,
    /// Written by a prepared transaction awaiting commit or rollback.
    Prepared,
    /// Published.
    Committed,
}

/// Transactional metadata shared by versions and page-delete markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMeta {
    /// Originating transaction; [`TxnId::NONE`] once the origin no longer matters.
    pub txn: TxnId,
    /// Resolution state.
    pub state: UpdateState,
    /// Commit timestamp, or none.
    pub commit_ts: Timestamp,
    /// Durable timestamp, or none.
    pub durable_ts: Timestamp,
    /// Prepare timestamp, or none.
    pub prepare_ts: Timestamp,
    /// Whether the originating transaction went through prepare.
    pub was_prepared: bool,
}

impl UpdateMeta {
    /// Metadata of a fresh write by `txn`.
    #[must_use]
    pub const fn uncommitted(txn: TxnId) -> Self {
        Self {
            txn,
            state: UpdateState::Uncommitted,
            commit_ts: Timestamp::NONE,
            durable_ts: Timestamp::NONE,
            prepare_ts: Timestamp::NONE,
            was_prepared: false,
        }
    }

    /// Metadata of a committed write whose origin is forgotten.
    #[must_use]
    pub const fn committed(commit_ts: Timestamp, durable_ts: Timestamp) -> Self {
        Self {
            txn: TxnId::NONE,
            state: UpdateState::Committed,
            commit_ts,
            durable_ts,
            prepare_ts: Timestamp::NONE,
            was_prepared: false,
        }
    }

    /// Whether the update is published.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self.state, UpdateState::Committed)
    }

    pub(crate) fn prepare(&mut self, prepare_ts: Timestamp) {
        self.state = UpdateState::Prepared;
        self.prepare_ts = prepare_ts;
        self.was_prepared = true;
    }

    pub(crate) fn commit(&mut self, commit_ts: Timestamp, durable_ts: Timestamp) {
        self.state = UpdateState::Committed;
        self.commit_ts = commit_ts;
        self.durable_ts = durable_ts;
    }
}

/// What a version carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// A value.
    Value(Value),
    /// A removal.
    Tombstone,
    /// A write lock with no data; discarded at commit.
    Reserve,
}

/// One version of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Transactional metadata.
    pub meta: UpdateMeta,
    /// Data.
    pub payload: Payload,
}

impl Version {
    /// Creates a version.
    #[must_use]
    pub const fn new(meta: UpdateMeta, payload: Payload) -> Self {
        Self { meta, payload }
    }

    /// Whether this is a tombstone.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        matches!(self.payload, Payload::Tombstone)
    }
}

/// The versions of one key, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    /// Creates an empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            versions: Vec::new(),
        }
    }

    /// Creates a chain from versions ordered oldest first.
    #[must_use]
    pub fn from_versions(versions: Vec<Version>) -> Self {
        Self { versions }
    }

    /// Appends a newer version.
    pub fn push(&mut self, version: Version) {
        self.versions.push(version);
    }

    /// The newest version.
    #[must_use]
    pub fn newest(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// Versions from newest to oldest.
    pub fn newest_first(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter().rev()
    }

    /// Versions from oldest to newest.
    #[must_use]
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub(crate) fn versions_mut(&mut self) -> &mut Vec<Version> {
        &mut self.versions
    }

    /// Whether the chain has no versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Number of versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether any version is unresolved.
    #[must_use]
    pub fn has_unresolved(&self) -> bool {
        self.versions.iter().any(|v| !v.meta.is_committed())
    }

    /// Applies `f` to every version written by `txn`.
    pub(crate) fn for_txn(&mut self, txn: TxnId, mut f: impl FnMut(&mut Version)) {
        for v in self.versions.iter_mut().filter(|v| v.meta.txn == txn) {
            f(v);
        }
    }

    /// Drops versions written by `txn`.
    pub(crate) fn discard_txn(&mut self, txn: TxnId) {
        self.versions.retain(|v| v.meta.txn != txn);
    }
}
