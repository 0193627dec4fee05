//! Database facade.

use crate::catalog::Catalog;
use crate::checkpoint::{capture, validate_name, CaptureState, CheckpointImage, CheckpointInfo, CheckpointStore};
use crate::config::{CheckpointConfig, DatabaseConfig, QueryTimestamp, SessionConfig, TimestampConfig};
#[cfg(feature = "std")]
use crate::dir::DatabaseDir;
use crate::error::{BusyKind, CoreError, CoreResult};
use crate::recovery::{recover, Recovered};
use crate::schema::TableFormat;
use crate::session::Session;
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::txn::{PreparedRecord, TransactionManager};
use crate::types::Timestamp;
#[cfg(feature = "std")]
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// State shared by a database and its sessions.
#[derive(Debug)]
pub(crate) struct Engine {
    pub(crate) config: DatabaseConfig,
    pub(crate) catalog: Catalog,
    pub(crate) txns: TransactionManager,
    pub(crate) checkpoints: CheckpointStore,
    pub(crate) stats: Arc<DatabaseStats>,
    /// Home directory (holds the lock). None for in-memory databases.
    #[cfg(feature = "std")]
    dir: Option<DatabaseDir>,
}

impl Engine {
    /// Takes a checkpoint and stores it in memory and, for home-directory
    /// databases, on disk.
    pub(crate) fn checkpoint(&self, config: &CheckpointConfig) -> CoreResult<CheckpointInfo> {
        let name = config.effective_name();
        validate_name(name)?;
        let _running = self.checkpoints.begin()?;
        let sequence = self.checkpoints.next_sequence();
        let created_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let image = {
            let _frozen = self.txns.freeze();
            let state = CaptureState {
                clocks: self.txns.clock().get(),
                prepared: self.txns.prepared(),
                next_txn_id: self.txns.next_id(),
            };
            capture(name, sequence, created_ms, &self.catalog, &state)
        };

        #[cfg(feature = "std")]
        if let Some(dir) = &self.dir {
            let data = crate::checkpoint::encode(&image)?;
            dir.save_checkpoint(name, &data, self.config.sync_checkpoints)?;
        }

        let info = CheckpointInfo::of(&image);
        self.checkpoints.install(Arc::new(image));
        self.txns.clock().set_last_checkpoint(info.stable);
        self.stats.record_checkpoint();
        tracing::info!(
            checkpoint = %info.name,
            sequence,
            stable = %info.stable,
            tables = info.tables.len(),
            prepared = info.prepared,
            "checkpoint complete"
        );
        self.prune();
        Ok(info)
    }

    /// Discards history no running reader can see.
    pub(crate) fn prune(&self) {
        let horizon = self.txns.horizon();
        let oldest = self.txns.pinned_oldest();
        let mut discarded = 0;
        for table in self.catalog.tables() {
            let keep_tombstones = table.format().is_fixed_column();
            discarded += table.tree.write().prune(horizon, oldest, keep_tombstones);
        }
        if discarded > 0 {
            self.stats.record_versions_discarded(discarded as u64);
            tracing::debug!(discarded, %oldest, "discarded obsolete versions");
        }
    }
}

/// The main database handle.
///
/// `Database` is the entry point of RangeDB. It provides:
/// - Sessions, which run transactions and open cursors
/// - The global oldest and stable timestamps
/// - Checkpoints and recovery from them
/// - Rollback to the stable timestamp
///
/// # Opening a Database
///
/// Use `Database::open()` to open a database from a home directory:
///
/// ```rust,ignore
/// use rangedb_core::{Database, TableConfig};
/// use std::path::Path;
///
/// let db = Database::open(Path::new("my_home"))?;
/// let session = db.open_session();
/// session.create("table:t", "key_format=q,value_format=S".parse()?)?;
///
/// let mut cursor = session.open_cursor("table:t", Default::default())?;
/// cursor.set_key(1i64);
/// cursor.set_value("one");
/// cursor.insert()?;
/// ```
///
/// # In-Memory Databases
///
/// For testing, use `Database::open_in_memory()`. Checkpoints of an
/// in-memory database live in memory and [`Database::restart`] recovers
/// from them:
///
/// ```rust,ignore
/// let mut db = Database::open_in_memory()?;
/// // ... writes, db.open_session().checkpoint(&Default::default())? ...
/// db.restart(None)?;
/// ```
#[derive(Debug)]
pub struct Database {
    engine: Arc<Engine>,
}

impl Database {
    /// Opens a fresh in-memory database.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with_config(DatabaseConfig::default())
    }

    /// Opens a fresh in-memory database with custom configuration.
    pub fn open_in_memory_with_config(config: DatabaseConfig) -> CoreResult<Self> {
        config.validate()?;
        let engine = Self::build(
            config,
            Vec::new(),
            #[cfg(feature = "std")]
            None,
        )?;
        Ok(Self { engine })
    }

    /// Opens a database from a home directory.
    ///
    /// The method:
    /// - Creates the directory if it doesn't exist (unless `create_if_missing` is false)
    /// - Acquires an exclusive lock to prevent concurrent access
    /// - Loads every checkpoint image in the home
    /// - Recovers from the newest one (or `recover_from`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process has the database locked (`DatabaseLocked`)
    /// - A checkpoint image is damaged (`CorruptCheckpoint`)
    /// - I/O errors occur
    #[cfg(feature = "std")]
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, DatabaseConfig::default())
    }

    /// Opens a database from a home directory with custom configuration.
    #[cfg(feature = "std")]
    pub fn open_with_config(path: &Path, config: DatabaseConfig) -> CoreResult<Self> {
        config.validate()?;
        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        let names = dir.list_checkpoints()?;
        if config.error_if_exists && !names.is_empty() {
            return Err(CoreError::invalid_argument(format!(
                "database already exists in {} and error_if_exists is set",
                path.display()
            )));
        }
        let mut images = Vec::with_capacity(names.len());
        for name in &names {
            let image = crate::checkpoint::decode(&dir.load_checkpoint(name)?)?;
            images.push(Arc::new(image));
        }
        let engine = Self::build(config, images, Some(dir))?;
        Ok(Self { engine })
    }

    fn build(
        config: DatabaseConfig,
        images: Vec<Arc<CheckpointImage>>,
        #[cfg(feature = "std")] dir: Option<DatabaseDir>,
    ) -> CoreResult<Arc<Engine>> {
        let stats = Arc::new(DatabaseStats::new());
        let Recovered {
            catalog,
            txns,
            checkpoints,
        } = recover(&config, images, &stats)?;
        Ok(Arc::new(Engine {
            config,
            catalog,
            txns,
            checkpoints,
            stats,
            #[cfg(feature = "std")]
            dir,
        }))
    }

    /// Simulates a crash and restart: every table is rebuilt from checkpoint
    /// `checkpoint` (the newest when `None`) and all other state is lost.
    ///
    /// Fails with `Busy` while sessions are open.
    pub fn restart(&mut self, checkpoint: Option<&str>) -> CoreResult<()> {
        let engine = Arc::get_mut(&mut self.engine).ok_or_else(|| {
            CoreError::busy(BusyKind::Dhandle, "sessions are still open on the database")
        })?;
        if let Some(name) = checkpoint {
            engine.checkpoints.image(name)?;
        }
        let mut config = engine.config.clone();
        config.recover_from = checkpoint.map(str::to_string);
        let images = engine.checkpoints.images();
        #[cfg(feature = "std")]
        let dir = engine.dir.take();
        tracing::info!(checkpoint = ?checkpoint, "restarting database");
        self.engine = Self::build(
            config,
            images,
            #[cfg(feature = "std")]
            dir,
        )?;
        Ok(())
    }

    /// Opens a session with default settings.
    #[must_use]
    pub fn open_session(&self) -> Session {
        self.open_session_with_config(SessionConfig::default())
    }

    /// Opens a session with custom settings.
    #[must_use]
    pub fn open_session_with_config(&self, config: SessionConfig) -> Session {
        Session::new(Arc::clone(&self.engine), config)
    }

    /// Advances the oldest and/or stable timestamps.
    ///
    /// Moving `oldest` forward discards history no reader can ask for.
    pub fn set_timestamp(&self, config: &TimestampConfig) -> CoreResult<()> {
        if self.engine.txns.set_timestamp(config)? {
            self.engine.prune();
        }
        Ok(())
    }

    /// Reads one of the global timestamps.
    #[must_use]
    pub fn query_timestamp(&self, which: QueryTimestamp) -> Timestamp {
        self.engine.txns.query(which)
    }

    /// Removes every committed version that is not durable at the stable
    /// timestamp. Returns the number of versions and page deletes removed.
    ///
    /// Fails with `Busy(UncommittedData)` while any transaction is running.
    pub fn rollback_to_stable(&self) -> CoreResult<usize> {
        let engine = &self.engine;
        let _frozen = engine.txns.freeze();
        if engine.txns.has_running() {
            return Err(CoreError::busy(
                BusyKind::UncommittedData,
                "rollback to stable requires that no transaction is running",
            ));
        }
        let stable = engine.txns.clock().get().stable;
        let removed: usize = engine
            .catalog
            .tables()
            .iter()
            .map(|t| t.tree.write().rollback_to_stable(stable))
            .sum();
        tracing::info!(%stable, removed, "rolled back to stable");
        Ok(removed)
    }

    /// Takes a checkpoint outside any session.
    pub fn checkpoint(&self, config: &CheckpointConfig) -> CoreResult<CheckpointInfo> {
        self.engine.checkpoint(config)
    }

    /// Summaries of every checkpoint, oldest first.
    #[must_use]
    pub fn checkpoints(&self) -> Vec<CheckpointInfo> {
        self.engine.checkpoints.list()
    }

    /// The image of checkpoint `name`.
    pub fn checkpoint_image(&self, name: &str) -> CoreResult<Arc<CheckpointImage>> {
        self.engine.checkpoints.image(name)
    }

    /// Prepared transactions reinstated by recovery that no session has claimed.
    #[must_use]
    pub fn unclaimed_prepared(&self) -> Vec<PreparedRecord> {
        self.engine.txns.unclaimed_prepared()
    }

    /// URIs of every table and index.
    #[must_use]
    pub fn tables(&self) -> Vec<String> {
        self.engine
            .catalog
            .tables()
            .iter()
            .map(|t| t.uri().to_string())
            .collect()
    }

    /// The format of table or index `uri`.
    pub fn table_format(&self, uri: &str) -> CoreResult<TableFormat> {
        Ok(self.engine.catalog.get(uri)?.format().clone())
    }

    /// Returns a point-in-time copy of the statistics.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats.snapshot()
    }

    /// The home directory, for databases opened from one.
    #[cfg(feature = "std")]
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.engine.dir.as_ref().map(DatabaseDir::path)
    }
}
