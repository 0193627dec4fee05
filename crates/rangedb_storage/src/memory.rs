//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// A byte store kept in process memory.
///
/// In-memory databases keep their checkpoint images here so that
/// `Database::restart` can rebuild from them exactly as a home-directory
/// database rebuilds from its `.ckpt` files.
///
/// # Example
///
/// ```rust
/// use rangedb_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// assert_eq!(backend.append(b"abc").unwrap(), 0);
/// assert_eq!(backend.append(b"de").unwrap(), 3);
/// assert_eq!(backend.read_at(2, 2).unwrap(), b"cd");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl Clone for InMemoryBackend {
    fn clone(&self) -> Self {
        Self::with_data(self.data())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        // end <= size, so both fit in usize
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn replace_discards_previous_image() {
        let mut backend = InMemoryBackend::new();
        backend.replace(b"a much longer first image").unwrap();
        backend.replace(b"short").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"short");
        assert_eq!(backend.size().unwrap(), 5);
    }

    #[test]
    fn read_all_of_empty_store() {
        let backend = InMemoryBackend::new();
        assert!(backend.read_all().unwrap().is_empty());
    }

    #[test]
    fn read_past_end_is_rejected() {
        let backend = InMemoryBackend::with_data(b"hello".to_vec());
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { size: 5, .. })
        ));
        assert!(matches!(
            backend.read_at(u64::MAX, 1),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn truncate_beyond_end_is_rejected() {
        let mut backend = InMemoryBackend::with_data(b"hello".to_vec());
        assert!(matches!(
            backend.truncate(6),
            Err(StorageError::TruncateBeyondEnd {
                requested: 6,
                size: 5
            })
        ));
        backend.truncate(2).unwrap();
        assert_eq!(backend.data(), b"he");
    }

    #[test]
    fn clone_is_independent() {
        let mut original = InMemoryBackend::with_data(b"one".to_vec());
        let copy = original.clone();
        original.replace(b"two").unwrap();
        assert_eq!(copy.data(), b"one");
    }

    proptest! {
        #[test]
        fn appended_chunks_read_back(chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..64), 0..16)) {
            let mut backend = InMemoryBackend::new();
            let mut offsets = Vec::new();
            for chunk in &chunks {
                offsets.push(backend.append(chunk).unwrap());
            }
            for (chunk, offset) in chunks.iter().zip(offsets) {
                prop_assert_eq!(&backend.read_at(offset, chunk.len()).unwrap(), chunk);
            }
        }
    }
}
