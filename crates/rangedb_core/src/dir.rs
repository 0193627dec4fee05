//! Database home directory management.
//!
//! This module handles the file system layout of a RangeDB home:
//!
//! ```text
//! <home>/
//! ├─ LOCK                      # Advisory lock for single-process access
//! ├─ RangeDBCheckpoint.ckpt    # Default checkpoint image
//! └─ <name>.ckpt               # Named checkpoint images
//! ```
//!
//! The LOCK file ensures only one process opens the home at a time.
//! Checkpoint images are written to a temporary file and renamed into
//! place, so a crash never leaves a half-written image under its real name.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use rangedb_storage::{FileBackend, StorageBackend};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
/// Extension of checkpoint image files.
pub const CHECKPOINT_EXTENSION: &str = "ckpt";
const TEMP_EXTENSION: &str = "ckpt.tmp";

/// Manages the home directory and its lock.
///
/// # Thread Safety
///
/// The `DatabaseDir` holds an exclusive lock on the home directory. Only
/// one `DatabaseDir` instance can exist per directory at a time.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    /// Held for exclusive access; released when dropped.
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_argument(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_argument(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the home directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the image of checkpoint `name`.
    #[must_use]
    pub fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.{CHECKPOINT_EXTENSION}"))
    }

    /// Names of the checkpoint images in the home, sorted.
    pub fn list_checkpoints(&self) -> CoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CHECKPOINT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Whether the home holds no checkpoint yet.
    pub fn is_new_database(&self) -> CoreResult<bool> {
        Ok(self.list_checkpoints()?.is_empty())
    }

    /// Reads the encoded image of checkpoint `name`.
    pub fn load_checkpoint(&self, name: &str) -> CoreResult<Vec<u8>> {
        let path = self.checkpoint_path(name);
        if !path.exists() {
            return Err(CoreError::invalid_argument(format!(
                "no checkpoint named {name} in {}",
                self.path.display()
            )));
        }
        Ok(FileBackend::open(&path)?.read_all()?)
    }

    /// Writes the encoded image of checkpoint `name` atomically.
    ///
    /// Uses write-then-rename:
    /// 1. Write the image to a temporary file (synced when `sync` is set)
    /// 2. Rename it over the checkpoint file
    /// 3. Fsync the directory so the rename is durable
    pub fn save_checkpoint(&self, name: &str, data: &[u8], sync: bool) -> CoreResult<()> {
        let temp_path = self.path.join(format!("{name}.{TEMP_EXTENSION}"));
        if temp_path.exists() {
            fs::remove_file(&temp_path)?;
        }
        let mut backend = FileBackend::open(&temp_path)?;
        backend.replace(data)?;
        if sync {
            backend.sync()?;
        }
        drop(backend);

        fs::rename(&temp_path, self.checkpoint_path(name))?;
        if sync {
            self.sync_directory()?;
        }
        Ok(())
    }

    /// Syncs the home directory so renames are durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        // NTFS journals metadata; directories cannot be fsynced on Windows.
        Ok(())
    }
}
