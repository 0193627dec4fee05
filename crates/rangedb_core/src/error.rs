//! Error types for rangedb core.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Why a resource was busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusyKind {
    /// A checkpoint is already running.
    CheckpointLock,
    /// The schema is being changed by another session.
    SchemaLock,
    /// The table is locked by another operation.
    TableLock,
    /// A backup holds the resource.
    Backup,
    /// The table handle is in use (open cursors).
    Dhandle,
    /// A transaction has uncommitted writes on the resource.
    UncommittedData,
    /// The resource has modified data not yet captured by a checkpoint.
    DirtyData,
}

impl fmt::Display for BusyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CheckpointLock => "checkpoint-lock",
            Self::SchemaLock => "schema-lock",
            Self::TableLock => "table-lock",
            Self::Backup => "backup",
            Self::Dhandle => "dhandle",
            Self::UncommittedData => "uncommitted-data",
            Self::DirtyData => "dirty-data",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in rangedb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No matching key.
    #[error("item not found")]
    NotFound,

    /// Insert without overwrite found the key already present.
    #[error("duplicate key")]
    DuplicateKey,

    /// A write or truncate conflicted with another transaction.
    #[error("conflict between concurrent operations, transaction must roll back: {reason}")]
    RollbackRequired {
        /// What conflicted.
        reason: String,
    },

    /// A read crossed a prepared, unresolved version.
    #[error("conflict with a prepared update")]
    PrepareConflict,

    /// Malformed configuration or an operation illegal in the current state.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The operation is not legal on this cursor or data source.
    #[error("operation not supported: {message}")]
    NotSupported {
        /// Description of the unsupported operation.
        message: String,
    },

    /// A resource needed by the operation is held elsewhere.
    #[error("resource busy ({kind}): {message}")]
    Busy {
        /// Sub-classification of the conflict.
        kind: BusyKind,
        /// Description of the holder.
        message: String,
    },

    /// Structural corruption; not recoverable at this layer.
    #[error("fatal error: {message}")]
    Fatal {
        /// Description of the corruption.
        message: String,
    },

    /// A checkpoint image could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A checkpoint image failed validation.
    #[error("corrupt checkpoint image: {message}")]
    CorruptCheckpoint {
        /// Description of the problem.
        message: String,
    },

    /// Another process has the database home locked.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] rangedb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a rollback-required error.
    pub fn rollback_required(reason: impl Into<String>) -> Self {
        Self::RollbackRequired {
            reason: reason.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Creates a busy error.
    pub fn busy(kind: BusyKind, message: impl Into<String>) -> Self {
        Self::Busy {
            kind,
            message: message.into(),
        }
    }

    /// Creates a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Creates a corrupt checkpoint error.
    pub fn corrupt_checkpoint(message: impl Into<String>) -> Self {
        Self::CorruptCheckpoint {
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same operation after waiting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PrepareConflict)
    }

    /// Whether the running transaction must be rolled back.
    #[must_use]
    pub fn requires_rollback(&self) -> bool {
        matches!(self, Self::RollbackRequired { .. })
    }

    /// Whether this is [`CoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// The busy sub-classification, if this is a busy error.
    #[must_use]
    pub fn busy_kind(&self) -> Option<BusyKind> {
        match self {
            Self::Busy { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(CoreError::PrepareConflict.is_retryable());
        assert!(!CoreError::PrepareConflict.requires_rollback());
        let conflict = CoreError::rollback_required("write conflict");
        assert!(conflict.requires_rollback());
        assert!(!conflict.is_retryable());
        assert!(!CoreError::NotFound.is_retryable());
    }

    #[test]
    fn busy_kind_is_reported() {
        let err = CoreError::busy(BusyKind::Dhandle, "table has open cursors");
        assert_eq!(err.busy_kind(), Some(BusyKind::Dhandle));
        assert_eq!(
            err.to_string(),
            "resource busy (dhandle): table has open cursors"
        );
        assert_eq!(CoreError::NotFound.busy_kind(), None);
    }
}
