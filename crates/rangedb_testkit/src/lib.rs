//! # RangeDB Testkit
//!
//! Test utilities for RangeDB.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//! - Invariant checkers for bounded cursors, timestamp visibility and
//!   truncate rollback
//! - End-to-end scenarios with literal values
//! - Crash recovery harness over on-disk homes
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rangedb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_temp_db(|db| {
//!         int_table(db, 1..=10, "v");
//!         let session = db.open_session();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod properties;
pub mod scenarios;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::properties::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
