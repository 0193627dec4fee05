//! Configuration for databases, transactions and cursors.
//!
//! Every configuration is a plain struct with chainable setters. Each one
//! also parses from the option-string form (`"read_timestamp=1e,ignore_prepare=true"`),
//! where timestamps are hexadecimal and unknown keys are rejected.

mod parse;

use crate::error::{CoreError, CoreResult};
use crate::schema::TableFormat;
use crate::types::{PreparedId, Timestamp};
use parse::parse_items;
use std::str::FromStr;

/// Default name of a checkpoint taken without an explicit name.
pub const DEFAULT_CHECKPOINT_NAME: &str = "RangeDBCheckpoint";

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Whether to create the database home if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database home already holds checkpoints.
    pub error_if_exists: bool,

    /// Number of records a leaf page holds before it splits.
    pub leaf_page_max_entries: usize,

    /// Whether prepared transactions found in a checkpoint's journal are
    /// reinstated on open instead of rolled back.
    pub preserve_prepared: bool,

    /// Whether checkpoint files are synced to disk.
    pub sync_checkpoints: bool,

    /// Checkpoint to recover from; the newest one when unset.
    pub recover_from: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            leaf_page_max_entries: 128,
            preserve_prepared: false,
            sync_checkpoints: true,
            recover_from: None,
        }
    }
}

impl DatabaseConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database home if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if the database already exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets the leaf page capacity.
    #[must_use]
    pub const fn leaf_page_max_entries(mut self, entries: usize) -> Self {
        self.leaf_page_max_entries = entries;
        self
    }

    /// Sets whether prepared transactions survive a restart.
    #[must_use]
    pub const fn preserve_prepared(mut self, value: bool) -> Self {
        self.preserve_prepared = value;
        self
    }

    /// Sets whether checkpoint files are synced.
    #[must_use]
    pub const fn sync_checkpoints(mut self, value: bool) -> Self {
        self.sync_checkpoints = value;
        self
    }

    /// Sets the checkpoint to recover from.
    #[must_use]
    pub fn recover_from(mut self, name: impl Into<String>) -> Self {
        self.recover_from = Some(name.into());
        self
    }

    pub(crate) fn validate(&self) -> CoreResult<()> {
        if self.leaf_page_max_entries < 2 {
            return Err(CoreError::invalid_argument(
                "leaf_page_max must allow at least two entries",
            ));
        }
        Ok(())
    }
}

impl FromStr for DatabaseConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "create" => config.create_if_missing = item.bool()?,
                "exclusive" => config.error_if_exists = item.bool()?,
                "leaf_page_max" => config.leaf_page_max_entries = item.usize()?,
                "preserve_prepared" => config.preserve_prepared = item.bool()?,
                "checkpoint_sync" => config.sync_checkpoints = item.bool()?,
                "recover_checkpoint" => config.recover_from = Some(item.string()?),
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Isolation level of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Isolation {
    /// One snapshot for the whole transaction.
    #[default]
    Snapshot,
    /// A fresh snapshot for every operation.
    ReadCommitted,
}

/// Session-wide defaults, set by `Session::reconfigure`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Isolation of transactions begun without an explicit level.
    pub isolation: Isolation,
    /// Whether transactions begun without an explicit setting ignore prepared updates.
    pub ignore_prepare: bool,
}

impl SessionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            isolation: Isolation::Snapshot,
            ignore_prepare: false,
        }
    }

    /// Sets the default isolation level.
    #[must_use]
    pub const fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Sets the default for `ignore_prepare`.
    #[must_use]
    pub const fn ignore_prepare(mut self, value: bool) -> Self {
        self.ignore_prepare = value;
        self
    }
}

impl FromStr for SessionConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::new();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "isolation" => config.isolation = item.isolation()?,
                "ignore_prepare" => config.ignore_prepare = item.bool()?,
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Storage engine type of a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TableKind {
    /// Ordered tree; supports bounds and range enumeration.
    #[default]
    Btree,
    /// Log-structured merge tree; announces no ordered-range support.
    Lsm,
}

/// Configuration for `Session::create`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TableConfig {
    /// Storage layout and formats.
    pub format: TableFormat,
    /// Engine type.
    pub kind: TableKind,
}

impl TableConfig {
    /// A b-tree table with the given format.
    #[must_use]
    pub fn new(format: TableFormat) -> Self {
        Self {
            format,
            kind: TableKind::Btree,
        }
    }

    /// Sets the engine type.
    #[must_use]
    pub const fn kind(mut self, kind: TableKind) -> Self {
        self.kind = kind;
        self
    }
}

impl FromStr for TableConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut key_format = String::from("u");
        let mut value_format = String::from("u");
        let mut kind = TableKind::Btree;
        for item in parse_items(s)? {
            match item.key.as_str() {
                "key_format" => key_format = item.string()?,
                "value_format" => value_format = item.string()?,
                "type" => {
                    kind = match item.value.as_str() {
                        "btree" | "file" => TableKind::Btree,
                        "lsm" => TableKind::Lsm,
                        _ => return Err(item.bad("btree or lsm")),
                    }
                }
                _ => return Err(item.unknown()),
            }
        }
        Ok(Self {
            format: TableFormat::from_formats(&key_format, &value_format)?,
            kind,
        })
    }
}

/// Configuration for `Session::begin_transaction`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeginConfig {
    /// Visibility frontier of the transaction's reads.
    pub read_timestamp: Option<Timestamp>,
    /// Skip prepared versions instead of conflicting on them.
    pub ignore_prepare: bool,
    /// Commit without timestamps; versions are visible at every read timestamp.
    pub no_timestamp: bool,
    /// Isolation level; the session default when unset.
    pub isolation: Option<Isolation>,
    /// Take over a prepared transaction reinstated by recovery.
    pub claim_prepared_id: Option<PreparedId>,
    /// Name reported in logs.
    pub name: Option<String>,
}

impl BeginConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the read timestamp.
    #[must_use]
    pub const fn read_timestamp(mut self, ts: Timestamp) -> Self {
        self.read_timestamp = Some(ts);
        self
    }

    /// Sets `ignore_prepare`.
    #[must_use]
    pub const fn ignore_prepare(mut self, value: bool) -> Self {
        self.ignore_prepare = value;
        self
    }

    /// Sets `no_timestamp`.
    #[must_use]
    pub const fn no_timestamp(mut self, value: bool) -> Self {
        self.no_timestamp = value;
        self
    }

    /// Sets the isolation level.
    #[must_use]
    pub const fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = Some(isolation);
        self
    }

    /// Claims a prepared transaction reinstated by recovery.
    #[must_use]
    pub const fn claim_prepared_id(mut self, id: PreparedId) -> Self {
        self.claim_prepared_id = Some(id);
        self
    }

    /// Sets the transaction name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl FromStr for BeginConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "read_timestamp" => config.read_timestamp = Some(item.timestamp()?),
                "ignore_prepare" => config.ignore_prepare = item.bool()?,
                "no_timestamp" => config.no_timestamp = item.bool()?,
                "isolation" => config.isolation = Some(item.isolation()?),
                "claim_prepared_id" => config.claim_prepared_id = Some(item.prepared_id()?),
                "name" => config.name = Some(item.string()?),
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Configuration for `Session::commit_transaction`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitConfig {
    /// Timestamp the writes are published at.
    pub commit_timestamp: Option<Timestamp>,
    /// Durability watermark (prepared transactions only).
    pub durable_timestamp: Option<Timestamp>,
}

impl CommitConfig {
    /// Creates a default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            commit_timestamp: None,
            durable_timestamp: None,
        }
    }

    /// Sets the commit timestamp.
    #[must_use]
    pub const fn commit_timestamp(mut self, ts: Timestamp) -> Self {
        self.commit_timestamp = Some(ts);
        self
    }

    /// Sets the durable timestamp.
    #[must_use]
    pub const fn durable_timestamp(mut self, ts: Timestamp) -> Self {
        self.durable_timestamp = Some(ts);
        self
    }
}

impl FromStr for CommitConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "commit_timestamp" => config.commit_timestamp = Some(item.timestamp()?),
                "durable_timestamp" => config.durable_timestamp = Some(item.timestamp()?),
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Configuration for `Session::prepare_transaction`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareConfig {
    /// Prepare timestamp; required.
    pub prepare_timestamp: Option<Timestamp>,
    /// Coordinator-assigned id.
    pub prepared_id: Option<PreparedId>,
}

impl PrepareConfig {
    /// Creates a configuration preparing at `ts`.
    #[must_use]
    pub const fn at(ts: Timestamp) -> Self {
        Self {
            prepare_timestamp: Some(ts),
            prepared_id: None,
        }
    }

    /// Sets the prepared id.
    #[must_use]
    pub const fn prepared_id(mut self, id: PreparedId) -> Self {
        self.prepared_id = Some(id);
        self
    }
}

impl FromStr for PrepareConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "prepare_timestamp" => config.prepare_timestamp = Some(item.timestamp()?),
                "prepared_id" => config.prepared_id = Some(item.prepared_id()?),
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Configuration for `Session::rollback_transaction`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackConfig {
    /// Required for prepared transactions; must not precede the prepare timestamp.
    pub rollback_timestamp: Option<Timestamp>,
}

impl RollbackConfig {
    /// Creates a default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rollback_timestamp: None,
        }
    }

    /// Sets the rollback timestamp.
    #[must_use]
    pub const fn rollback_timestamp(mut self, ts: Timestamp) -> Self {
        self.rollback_timestamp = Some(ts);
        self
    }
}

impl FromStr for RollbackConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "rollback_timestamp" => config.rollback_timestamp = Some(item.timestamp()?),
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Configuration for `Database::set_timestamp`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampConfig {
    /// New oldest timestamp.
    pub oldest_timestamp: Option<Timestamp>,
    /// New stable timestamp.
    pub stable_timestamp: Option<Timestamp>,
}

impl TimestampConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            oldest_timestamp: None,
            stable_timestamp: None,
        }
    }

    /// Sets the oldest timestamp.
    #[must_use]
    pub const fn oldest(mut self, ts: Timestamp) -> Self {
        self.oldest_timestamp = Some(ts);
        self
    }

    /// Sets the stable timestamp.
    #[must_use]
    pub const fn stable(mut self, ts: Timestamp) -> Self {
        self.stable_timestamp = Some(ts);
        self
    }
}

impl FromStr for TimestampConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "oldest_timestamp" => config.oldest_timestamp = Some(item.timestamp()?),
                "stable_timestamp" => config.stable_timestamp = Some(item.timestamp()?),
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Configuration for `Session::timestamp_transaction`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnTimestampConfig {
    /// Commit timestamp for subsequent writes.
    pub commit_timestamp: Option<Timestamp>,
    /// Durable timestamp (prepared transactions only).
    pub durable_timestamp: Option<Timestamp>,
    /// Read timestamp, if not already set.
    pub read_timestamp: Option<Timestamp>,
}

impl TxnTimestampConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            commit_timestamp: None,
            durable_timestamp: None,
            read_timestamp: None,
        }
    }

    /// Sets the commit timestamp.
    #[must_use]
    pub const fn commit_timestamp(mut self, ts: Timestamp) -> Self {
        self.commit_timestamp = Some(ts);
        self
    }

    /// Sets the durable timestamp.
    #[must_use]
    pub const fn durable_timestamp(mut self, ts: Timestamp) -> Self {
        self.durable_timestamp = Some(ts);
        self
    }

    /// Sets the read timestamp.
    #[must_use]
    pub const fn read_timestamp(mut self, ts: Timestamp) -> Self {
        self.read_timestamp = Some(ts);
        self
    }
}

impl FromStr for TxnTimestampConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "commit_timestamp" => config.commit_timestamp = Some(item.timestamp()?),
                "durable_timestamp" => config.durable_timestamp = Some(item.timestamp()?),
                "read_timestamp" => config.read_timestamp = Some(item.timestamp()?),
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Which global timestamp `Database::query_timestamp` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTimestamp {
    /// The oldest timestamp.
    Oldest,
    /// The stable timestamp.
    Stable,
    /// The largest durable timestamp with no running commit behind it.
    AllDurable,
    /// The stable timestamp of the last checkpoint.
    LastCheckpoint,
}

impl FromStr for QueryTimestamp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let items = parse_items(s)?;
        let mut query = Self::AllDurable;
        for item in items {
            match item.key.as_str() {
                "get" => {
                    query = match item.value.as_str() {
                        "oldest" | "oldest_timestamp" => Self::Oldest,
                        "stable" | "stable_timestamp" => Self::Stable,
                        "all_durable" => Self::AllDurable,
                        "last_checkpoint" => Self::LastCheckpoint,
                        _ => return Err(item.bad("oldest, stable, all_durable or last_checkpoint")),
                    }
                }
                _ => return Err(item.unknown()),
            }
        }
        Ok(query)
    }
}

/// Configuration for `Session::open_cursor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorConfig {
    /// Insert/update may replace existing records, remove of a missing key succeeds.
    pub overwrite: bool,
    /// Insert into a column store allocates the next record number.
    pub append: bool,
    /// Return records in random order.
    pub next_random: bool,
    /// Read from this checkpoint instead of live data.
    pub checkpoint: Option<String>,
    /// Read timestamp for a checkpoint cursor.
    pub checkpoint_read_timestamp: Option<Timestamp>,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            overwrite: true,
            append: false,
            next_random: false,
            checkpoint: None,
            checkpoint_read_timestamp: None,
        }
    }
}

impl CursorConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `overwrite`.
    #[must_use]
    pub const fn overwrite(mut self, value: bool) -> Self {
        self.overwrite = value;
        self
    }

    /// Sets `append`.
    #[must_use]
    pub const fn append(mut self, value: bool) -> Self {
        self.append = value;
        self
    }

    /// Sets `next_random`.
    #[must_use]
    pub const fn next_random(mut self, value: bool) -> Self {
        self.next_random = value;
        self
    }

    /// Opens the cursor on a checkpoint.
    #[must_use]
    pub fn checkpoint(mut self, name: impl Into<String>) -> Self {
        self.checkpoint = Some(name.into());
        self
    }

    /// Sets the checkpoint read timestamp.
    #[must_use]
    pub const fn checkpoint_read_timestamp(mut self, ts: Timestamp) -> Self {
        self.checkpoint_read_timestamp = Some(ts);
        self
    }
}

impl FromStr for CursorConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "overwrite" => config.overwrite = item.bool()?,
                "append" => config.append = item.bool()?,
                "next_random" => config.next_random = item.bool()?,
                "checkpoint" => config.checkpoint = Some(item.string()?),
                "debug" => {
                    for nested in parse_items(&item.value)? {
                        match nested.key.as_str() {
                            "checkpoint_read_timestamp" => {
                                config.checkpoint_read_timestamp = Some(nested.timestamp()?);
                            }
                            _ => return Err(nested.unknown()),
                        }
                    }
                }
                "checkpoint_read_timestamp" => {
                    config.checkpoint_read_timestamp = Some(item.timestamp()?);
                }
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Whether `Cursor::bound` installs or removes bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundAction {
    /// Install one bound at the staged key.
    #[default]
    Set,
    /// Remove both bounds.
    Clear,
}

/// Which end of the range a bound defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    /// Lower end.
    Lower,
    /// Upper end.
    Upper,
}

/// Configuration for `Cursor::bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundConfig {
    /// Set or clear.
    pub action: BoundAction,
    /// Which bound; required for `Set`.
    pub bound: Option<BoundKind>,
    /// Whether the bound key itself is in range.
    pub inclusive: bool,
}

impl Default for BoundConfig {
    fn default() -> Self {
        Self {
            action: BoundAction::Set,
            bound: None,
            inclusive: true,
        }
    }
}

impl BoundConfig {
    /// An inclusive lower bound.
    #[must_use]
    pub const fn lower() -> Self {
        Self {
            action: BoundAction::Set,
            bound: Some(BoundKind::Lower),
            inclusive: true,
        }
    }

    /// An inclusive upper bound.
    #[must_use]
    pub const fn upper() -> Self {
        Self {
            action: BoundAction::Set,
            bound: Some(BoundKind::Upper),
            inclusive: true,
        }
    }

    /// Removes both bounds.
    #[must_use]
    pub const fn clear() -> Self {
        Self {
            action: BoundAction::Clear,
            bound: None,
            inclusive: true,
        }
    }

    /// Sets inclusivity.
    #[must_use]
    pub const fn inclusive(mut self, value: bool) -> Self {
        self.inclusive = value;
        self
    }
}

impl FromStr for BoundConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "action" => {
                    config.action = match item.value.as_str() {
                        "set" => BoundAction::Set,
                        "clear" => BoundAction::Clear,
                        _ => return Err(item.bad("set or clear")),
                    }
                }
                "bound" => {
                    config.bound = Some(match item.value.as_str() {
                        "lower" => BoundKind::Lower,
                        "upper" => BoundKind::Upper,
                        _ => return Err(item.bad("lower or upper")),
                    })
                }
                "inclusive" => config.inclusive = item.bool()?,
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Configuration for `Session::checkpoint`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointConfig {
    /// Checkpoint name; [`DEFAULT_CHECKPOINT_NAME`] when unset.
    pub name: Option<String>,
}

impl CheckpointConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the checkpoint name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The effective checkpoint name.
    #[must_use]
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_CHECKPOINT_NAME)
    }
}

impl FromStr for CheckpointConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "name" => config.name = Some(item.string()?),
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

/// Configuration for `Session::drop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropConfig {
    /// Succeed when the object does not exist.
    pub force: bool,
}

impl DropConfig {
    /// Creates a default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self { force: false }
    }

    /// Sets `force`.
    #[must_use]
    pub const fn force(mut self, value: bool) -> Self {
        self.force = value;
        self
    }
}

impl FromStr for DropConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();
        for item in parse_items(s)? {
            match item.key.as_str() {
                "force" => config.force = item.bool()?,
                // Never waits; accepted for compatibility.
                "lock_wait" => {
                    item.bool()?;
                }
                _ => return Err(item.unknown()),
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KeyFormat, ValueFormat};

    #[test]
    fn default_database_config() {
        let config = DatabaseConfig::default();
        assert!(config.create_if_missing);
        assert!(!config.error_if_exists);
        assert!(!config.preserve_prepared);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = DatabaseConfig::new()
            .create_if_missing(false)
            .leaf_page_max_entries(8)
            .preserve_prepared(true);

        assert!(!config.create_if_missing);
        assert_eq!(config.leaf_page_max_entries, 8);
        assert!(config.preserve_prepared);
        assert!(DatabaseConfig::new()
            .leaf_page_max_entries(1)
            .validate()
            .is_err());
    }

    #[test]
    fn begin_config_from_string() {
        let config: BeginConfig = "read_timestamp=19,ignore_prepare=true".parse().unwrap();
        assert_eq!(config.read_timestamp, Some(Timestamp::new(25)));
        assert!(config.ignore_prepare);
        assert!("read_timestamp=zz".parse::<BeginConfig>().is_err());
        assert!("isolation=chaos".parse::<BeginConfig>().is_err());
        let config: BeginConfig = "isolation=read-committed".parse().unwrap();
        assert_eq!(config.isolation, Some(Isolation::ReadCommitted));
    }

    #[test]
    fn session_config_from_string() {
        let config: SessionConfig = "isolation=read-committed,ignore_prepare".parse().unwrap();
        assert_eq!(config.isolation, Isolation::ReadCommitted);
        assert!(config.ignore_prepare);
        assert_eq!(SessionConfig::default(), SessionConfig::new());
    }

    #[test]
    fn commit_and_prepare_from_string() {
        let commit: CommitConfig = "commit_timestamp=19,durable_timestamp=23".parse().unwrap();
        assert_eq!(commit.commit_timestamp, Some(Timestamp::new(25)));
        assert_eq!(commit.durable_timestamp, Some(Timestamp::new(35)));

        let prepare: PrepareConfig = "prepare_timestamp=14,prepared_id=7".parse().unwrap();
        assert_eq!(prepare.prepare_timestamp, Some(Timestamp::new(20)));
        assert_eq!(prepare.prepared_id, Some(PreparedId::new(7)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = "commit_timestmp=1".parse::<CommitConfig>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        assert!("colour=blue".parse::<CursorConfig>().is_err());
    }

    #[test]
    fn bound_config_from_string() {
        let config: BoundConfig = "bound=upper,inclusive=false".parse().unwrap();
        assert_eq!(config.action, BoundAction::Set);
        assert_eq!(config.bound, Some(BoundKind::Upper));
        assert!(!config.inclusive);

        let clear: BoundConfig = "action=clear".parse().unwrap();
        assert_eq!(clear.action, BoundAction::Clear);
        assert!("bound=middle".parse::<BoundConfig>().is_err());
    }

    #[test]
    fn cursor_config_defaults_to_overwrite() {
        let config: CursorConfig = "".parse().unwrap();
        assert!(config.overwrite);
        let config: CursorConfig = "overwrite=false,checkpoint=RangeDBCheckpoint,debug=(checkpoint_read_timestamp=a)"
            .parse()
            .unwrap();
        assert!(!config.overwrite);
        assert_eq!(config.checkpoint.as_deref(), Some(DEFAULT_CHECKPOINT_NAME));
        assert_eq!(config.checkpoint_read_timestamp, Some(Timestamp::new(10)));
    }

    #[test]
    fn table_config_from_string() {
        let config: TableConfig = "key_format=S,value_format=S,type=lsm".parse().unwrap();
        assert_eq!(config.kind, TableKind::Lsm);
        assert_eq!(
            config.format,
            TableFormat::row(KeyFormat::String, ValueFormat::String)
        );
        let flcs: TableConfig = "key_format=r,value_format=8t".parse().unwrap();
        assert!(flcs.format.is_fixed_column());
    }

    #[test]
    fn query_timestamp_from_string() {
        assert_eq!(
            "get=stable".parse::<QueryTimestamp>().unwrap(),
            QueryTimestamp::Stable
        );
        assert_eq!("".parse::<QueryTimestamp>().unwrap(), QueryTimestamp::AllDurable);
        assert!("get=now".parse::<QueryTimestamp>().is_err());
    }

    #[test]
    fn checkpoint_name_defaults() {
        assert_eq!(CheckpointConfig::new().effective_name(), DEFAULT_CHECKPOINT_NAME);
        assert_eq!(CheckpointConfig::new().name("a").effective_name(), "a");
    }
}
