//! Checkpoints: named, consistent images of every table.
//!
//! A checkpoint is captured while transaction resolution is frozen, so it
//! never holds half of a commit, rollback or fast truncate. Images are kept
//! in memory for checkpoint cursors and restarts, and written to the
//! database home when there is one.

mod codec;
mod image;
mod journal;

pub use codec::{decode, encode, verify, ImageHeader};
pub use image::{CheckpointImage, TableImage};
pub use journal::{JournalEntry, PreparedJournal};

pub(crate) use image::{capture, CaptureState};

use crate::error::{BusyKind, CoreError, CoreResult};
use crate::stats::DatabaseStats;
use crate::store::Table;
use crate::types::Timestamp;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Summary of a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointInfo {
    /// Image id.
    pub id: Uuid,
    /// Checkpoint name.
    pub name: String,
    /// Sequence number; later checkpoints have larger ones.
    pub sequence: u64,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_ms: u64,
    /// Oldest timestamp at capture.
    pub oldest: Timestamp,
    /// Stable timestamp the image is consistent at.
    pub stable: Timestamp,
    /// Record count per table URI.
    pub tables: BTreeMap<String, usize>,
    /// Number of prepared transactions in the journal.
    pub prepared: usize,
}

impl CheckpointInfo {
    /// Summarizes an image.
    #[must_use]
    pub fn of(image: &CheckpointImage) -> Self {
        Self {
            id: image.id,
            name: image.name.clone(),
            sequence: image.sequence,
            created_ms: image.created_ms,
            oldest: image.oldest,
            stable: image.stable,
            tables: image
                .tables
                .iter()
                .map(|t| (t.uri.clone(), t.record_count()))
                .collect(),
            prepared: image.journal.len(),
        }
    }
}

#[derive(Debug)]
struct StoredCheckpoint {
    image: Arc<CheckpointImage>,
    tables: BTreeMap<String, Arc<Table>>,
}

/// Checkpoint names become file names, so they are kept to a safe alphabet.
pub(crate) fn validate_name(name: &str) -> CoreResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::invalid_argument(format!(
            "invalid checkpoint name {name:?}"
        )))
    }
}

/// The checkpoints of one database.
#[derive(Debug)]
pub struct CheckpointStore {
    images: RwLock<BTreeMap<String, StoredCheckpoint>>,
    sequence: AtomicU64,
    running: Mutex<()>,
    leaf_page_max_entries: usize,
    stats: Arc<DatabaseStats>,
}

impl CheckpointStore {
    /// Creates a store holding `images`.
    pub fn new(
        images: Vec<Arc<CheckpointImage>>,
        leaf_page_max_entries: usize,
        stats: Arc<DatabaseStats>,
    ) -> Self {
        let store = Self {
            images: RwLock::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
            running: Mutex::new(()),
            leaf_page_max_entries,
            stats,
        };
        for image in images {
            store.install(image);
        }
        store
    }

    /// Claims the right to take a checkpoint. Fails instead of waiting when
    /// another checkpoint is running.
    pub(crate) fn begin(&self) -> CoreResult<MutexGuard<'_, ()>> {
        self.running.try_lock().ok_or_else(|| {
            CoreError::busy(BusyKind::CheckpointLock, "a checkpoint is already running")
        })
    }

    /// The sequence number the next checkpoint gets.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Stores an image, replacing any checkpoint of the same name.
    pub(crate) fn install(&self, image: Arc<CheckpointImage>) {
        self.sequence.fetch_max(image.sequence, Ordering::SeqCst);
        let tables = image.detached_tables(self.leaf_page_max_entries, &self.stats);
        self.images
            .write()
            .insert(image.name.clone(), StoredCheckpoint { image, tables });
    }

    /// The image named `name`.
    pub fn image(&self, name: &str) -> CoreResult<Arc<CheckpointImage>> {
        self.images
            .read()
            .get(name)
            .map(|c| Arc::clone(&c.image))
            .ok_or_else(|| CoreError::invalid_argument(format!("no checkpoint named {name}")))
    }

    /// The most recently taken image.
    #[must_use]
    pub fn newest(&self) -> Option<Arc<CheckpointImage>> {
        self.images
            .read()
            .values()
            .max_by_key(|c| c.image.sequence)
            .map(|c| Arc::clone(&c.image))
    }

    /// Every image, oldest first.
    #[must_use]
    pub fn images(&self) -> Vec<Arc<CheckpointImage>> {
        let mut images: Vec<_> = self
            .images
            .read()
            .values()
            .map(|c| Arc::clone(&c.image))
            .collect();
        images.sort_by_key(|i| i.sequence);
        images
    }

    /// Summaries of every checkpoint, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<CheckpointInfo> {
        self.images().iter().map(|i| CheckpointInfo::of(i)).collect()
    }

    /// A read-only table over checkpoint `name`, and the stable timestamp
    /// the checkpoint is consistent at.
    pub(crate) fn table(&self, name: &str, uri: &str) -> CoreResult<(Arc<Table>, Timestamp)> {
        let images = self.images.read();
        let stored = images
            .get(name)
            .ok_or_else(|| CoreError::invalid_argument(format!("no checkpoint named {name}")))?;
        let table = stored.tables.get(uri).ok_or_else(|| {
            CoreError::invalid_argument(format!("checkpoint {name} has no object {uri}"))
        })?;
        Ok((Arc::clone(table), stored.image.stable))
    }
}
