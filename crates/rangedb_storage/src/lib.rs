//! # rangedb storage
//!
//! Byte-store backends for rangedb.
//!
//! The engine keeps its tables in memory; what reaches a backend is the
//! encoded checkpoint image produced by `rangedb_core`. Backends never
//! interpret those bytes.
//!
//! ## Design Principles
//!
//! - A backend is an append-only byte store with explicit `flush`/`sync`
//! - A checkpoint image is rewritten wholesale with [`StorageBackend::replace`]
//! - Backends must be `Send + Sync` so checkpoints can run beside readers
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - images of in-memory databases and tests
//! - [`FileBackend`] - `<name>.ckpt` files inside a database home
//!
//! ## Example
//!
//! ```rust
//! use rangedb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.replace(b"image v1").unwrap();
//! backend.replace(b"v2").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"v2");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
