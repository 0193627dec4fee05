//! # RangeDB Core
//!
//! Core engine for RangeDB, an ordered multi-version key-value store.
//!
//! This crate provides:
//! - Tables in row-store, variable-length column and fixed-length column
//!   layouts, with secondary indexes
//! - Cursors with optional lower and upper key bounds
//! - Snapshot transactions with read, commit and durable timestamps, and
//!   two-phase commit through prepared transactions
//! - Range truncate, with whole leaf pages removed in one step
//! - Named checkpoints that survive restarts, carrying a journal of
//!   prepared transactions
//! - Rollback to the stable timestamp
//!
//! ## Example
//!
//! ```rust,ignore
//! use rangedb_core::{BeginConfig, CommitConfig, Database, Timestamp};
//!
//! let db = Database::open_in_memory()?;
//! let session = db.open_session();
//! session.create("table:t", "key_format=S,value_format=S".parse()?)?;
//!
//! session.begin_transaction(&BeginConfig::new())?;
//! let mut cursor = session.open_cursor("table:t", Default::default())?;
//! cursor.set_key("a");
//! cursor.set_value("1");
//! cursor.insert()?;
//! drop(cursor);
//! session.commit_transaction(&CommitConfig::new().commit_timestamp(Timestamp::new(10)))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
pub mod checkpoint;
pub mod config;
pub mod cursor;
mod database;
#[cfg(feature = "std")]
mod dir;
mod error;
mod recovery;
pub mod schema;
mod session;
mod stats;
pub mod store;
mod truncate;
pub mod txn;
mod types;

pub use catalog::Catalog;
pub use checkpoint::{CheckpointImage, CheckpointInfo};
pub use config::{
    BeginConfig, BoundAction, BoundConfig, BoundKind, CheckpointConfig, CommitConfig,
    CursorConfig, DatabaseConfig, DropConfig, Isolation, PrepareConfig, QueryTimestamp,
    RollbackConfig, SessionConfig, TableConfig, TableKind, TimestampConfig, TxnTimestampConfig,
    DEFAULT_CHECKPOINT_NAME,
};
pub use cursor::{Bounds, Cursor, KeyBound, Position};
pub use database::Database;
#[cfg(feature = "std")]
pub use dir::{DatabaseDir, CHECKPOINT_EXTENSION};
pub use error::{BusyKind, CoreError, CoreResult};
pub use schema::{FieldFormat, Key, KeyFormat, Modify, TableFormat, Value, ValueFormat};
pub use session::Session;
pub use stats::{DatabaseStats, StatsSnapshot};
pub use txn::{PreparedRecord, TxnState};
pub use types::{PreparedId, TableId, Timestamp, TxnId};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
