//! Leaf pages and fast-delete markers.

use super::version::{Payload, UpdateMeta, Version, VersionChain};
use crate::schema::Key;
use std::collections::BTreeMap;

/// A truncate applied to a whole page without touching its records.
///
/// Readers treat the marker as a tombstone newer than every version on the
/// page. Rolling back the truncate just drops the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDelete {
    /// Transaction metadata of the truncate.
    pub meta: UpdateMeta,
}

/// A leaf page: the records from its fence key up to the next page's fence.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Smallest key the page may hold; `None` for the first page.
    pub(crate) lower: Option<Key>,
    pub(crate) entries: BTreeMap<Key, VersionChain>,
    pub(crate) deleted: Option<PageDelete>,
}

impl Page {
    pub(crate) fn new(lower: Option<Key>) -> Self {
        Self {
            lower,
            entries: BTreeMap::new(),
            deleted: None,
        }
    }

    /// Number of records (including removed ones still carrying history).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the page holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The fast-delete marker, if any.
    #[must_use]
    pub fn deleted(&self) -> Option<&PageDelete> {
        self.deleted.as_ref()
    }

    /// First and last record keys.
    #[must_use]
    pub fn key_span(&self) -> Option<(&Key, &Key)> {
        let first = self.entries.keys().next()?;
        let last = self.entries.keys().next_back()?;
        Some((first, last))
    }

    /// Records of the page.
    pub fn entries(&self) -> impl Iterator<Item = (&Key, &VersionChain)> {
        self.entries.iter()
    }

    /// Replaces the marker with per-record tombstones carrying the same
    /// metadata. Returns whether a marker was instantiated.
    pub(crate) fn instantiate(&mut self) -> bool {
        let Some(marker) = self.deleted.take() else {
            return false;
        };
        for chain in self.entries.values_mut() {
            chain.push(Version::new(marker.meta, Payload::Tombstone));
        }
        true
    }

    /// Splits off the upper half when the page is over capacity.
    pub(crate) fn split_if_needed(&mut self, max_entries: usize) -> Option<Page> {
        if self.entries.len() <= max_entries || self.deleted.is_some() {
            return None;
        }
        let mid = self.entries.keys().nth(self.entries.len() / 2)?.clone();
        let upper = self.entries.split_off(&mid);
        Some(Page {
            lower: Some(mid),
            entries: upper,
            deleted: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;
    use crate::types::{Timestamp, TxnId};

    fn page_with(keys: &[i64]) -> Page {
        let mut page = Page::new(None);
        for k in keys {
            let mut chain = VersionChain::new();
            chain.push(Version::new(
                UpdateMeta::committed(Timestamp::new(1), Timestamp::new(1)),
                Payload::Value(Value::Int(*k)),
            ));
            page.entries.insert(Key::int(*k), chain);
        }
        page
    }

    #[test]
    fn split_moves_upper_half() {
        let mut page = page_with(&[1, 2, 3, 4, 5]);
        let upper = page.split_if_needed(4).unwrap();
        assert_eq!(upper.lower, Some(Key::int(3)));
        assert_eq!(page.len(), 2);
        assert_eq!(upper.len(), 3);
        assert!(page.split_if_needed(4).is_none());
    }

    #[test]
    fn marked_pages_do_not_split() {
        let mut page = page_with(&[1, 2, 3]);
        page.deleted = Some(PageDelete {
            meta: UpdateMeta::uncommitted(TxnId::new(3)),
        });
        assert!(page.split_if_needed(2).is_none());
    }

    #[test]
    fn instantiate_turns_marker_into_tombstones() {
        let mut page = page_with(&[1, 2]);
        let meta = UpdateMeta::uncommitted(TxnId::new(3));
        page.deleted = Some(PageDelete { meta });
        assert!(page.instantiate());
        assert!(page.deleted.is_none());
        for (_, chain) in page.entries() {
            assert_eq!(chain.len(), 2);
            assert!(chain.newest().unwrap().is_tombstone());
            assert_eq!(chain.newest().unwrap().meta, meta);
        }
        assert!(!page.instantiate());
    }

    #[test]
    fn key_span() {
        assert_eq!(page_with(&[]).key_span(), None);
        let page = page_with(&[4, 9, 6]);
        assert_eq!(page.key_span(), Some((&Key::int(4), &Key::int(9))));
    }
}
