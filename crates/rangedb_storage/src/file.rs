//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A byte store backed by one file.
///
/// A database home keeps one file per named checkpoint. `flush` hands
/// the bytes to the OS, `sync` makes data and metadata durable.
///
/// # Example
///
/// ```no_run
/// use rangedb_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("home/RangeDBCheckpoint.ckpt")).unwrap();
/// backend.replace(b"encoded image").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    /// File handle and cached size, always updated together.
    inner: Mutex<(File, u64)>,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new((file, size)),
        })
    }

    /// Opens the file, creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut guard = self.inner.lock();
        let (file, size) = &mut *guard;
        let end = offset.saturating_add(len as u64);
        if end > *size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: *size,
            });
        }
        let mut buffer = vec![0u8; len];
        if len > 0 {
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut guard = self.inner.lock();
        let (file, size) = &mut *guard;
        let offset = *size;
        if !data.is_empty() {
            file.seek(SeekFrom::End(0))?;
            file.write_all(data)?;
            *size += data.len() as u64;
        }
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.lock().0.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().1)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.lock().0.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let (file, size) = &mut *guard;
        if new_size > *size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: *size,
            });
        }
        file.set_len(new_size)?;
        *size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn image_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ckpt.ckpt");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.replace(b"first image, longer").unwrap();
            backend.replace(b"second image").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"second image");
    }

    #[test]
    fn offsets_follow_appends() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("a.bin")).unwrap();
        assert_eq!(backend.append(b"head").unwrap(), 0);
        assert_eq!(backend.append(b"").unwrap(), 4);
        assert_eq!(backend.append(b"tail").unwrap(), 4);
        assert_eq!(backend.read_at(2, 4).unwrap(), b"adta");
    }

    #[test]
    fn read_past_end_is_rejected() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("a.bin")).unwrap();
        backend.append(b"hello").unwrap();
        assert!(matches!(
            backend.read_at(4, 2),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn truncate_beyond_end_is_rejected() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("a.bin")).unwrap();
        backend.append(b"abc").unwrap();
        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncateBeyondEnd { .. })
        ));
    }

    #[test]
    fn nested_home_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("home").join("nested").join("x.ckpt");
        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path);
        assert!(path.exists());
    }
}
