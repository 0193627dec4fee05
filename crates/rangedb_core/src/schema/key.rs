//! Keys and their schema-defined ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A key in a table or index.
///
/// Keys are compared with the derived ordering *after* normalization by the
/// table's [`TableFormat`](super::TableFormat): integers numerically, strings and byte
/// arrays lexicographically by byte, fixed-width strings over their
/// NUL-padded form, composites field by field, record numbers numerically.
/// Within one table every key has the same shape, so the variant order of
/// the derived `Ord` never decides a comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Signed integer key.
    Int(i64),
    /// Record number of a column store (1-based).
    Recno(u64),
    /// String key (variable or fixed width).
    Str(String),
    /// Raw byte-array key.
    Bytes(Vec<u8>),
    /// Composite key; each field is a scalar key.
    Composite(Vec<Key>),
}

impl Key {
    /// Creates an integer key.
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::Int(value)
    }

    /// Creates a record-number key.
    #[must_use]
    pub const fn recno(value: u64) -> Self {
        Self::Recno(value)
    }

    /// Creates a string key.
    #[must_use]
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Creates a byte-array key.
    #[must_use]
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(value.into())
    }

    /// Creates a composite key.
    #[must_use]
    pub fn composite(fields: impl IntoIterator<Item = Key>) -> Self {
        Self::Composite(fields.into_iter().collect())
    }

    /// The record number, if this is a record-number key.
    #[must_use]
    pub fn as_recno(&self) -> Option<u64> {
        match self {
            Self::Recno(n) => Some(*n),
            _ => None,
        }
    }

    /// The fields of a composite key; a scalar is its own single field.
    #[must_use]
    pub fn fields(&self) -> &[Key] {
        match self {
            Self::Composite(fields) => fields,
            scalar => std::slice::from_ref(scalar),
        }
    }

    /// Compares the leading fields of `self` against all fields of `prefix`.
    ///
    /// Used by index cursors, whose entries carry the primary key after the
    /// index columns but whose bounds name the index columns only.
    #[must_use]
    pub fn cmp_prefix(&self, prefix: &Key) -> Ordering {
        let wanted = prefix.fields();
        let own = self.fields();
        own[..wanted.len().min(own.len())].cmp(wanted)
    }

    /// The next record number, or `None` at the top of the record space.
    #[must_use]
    pub fn next_recno(&self) -> Option<Key> {
        self.as_recno()
            .and_then(|n| n.checked_add(1))
            .map(Key::Recno)
    }

    /// The previous record number, or `None` below record 1.
    #[must_use]
    pub fn prev_recno(&self) -> Option<Key> {
        self.as_recno()
            .filter(|n| *n > 1)
            .map(|n| Key::Recno(n - 1))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<u8>> for Key {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Key {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Recno(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{:?}", s.trim_end_matches('\0')),
            Self::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Composite(fields) => {
                f.write_str("(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_keys_order_numerically() {
        assert!(Key::int(-5) < Key::int(3));
        assert!(Key::int(9) < Key::int(10));
    }

    #[test]
    fn string_prefix_sorts_first() {
        assert!(Key::str("ab") < Key::str("abc"));
        assert!(Key::str("aaz") < Key::str("ab"));
    }

    #[test]
    fn byte_keys_compare_unsigned() {
        assert!(Key::bytes(vec![0x7f]) < Key::bytes(vec![0x80]));
        assert!(Key::bytes(vec![0xff, 0xfe]) < Key::bytes(vec![0xff, 0xff]));
    }

    #[test]
    fn composite_compares_field_by_field() {
        let a = Key::composite([Key::int(1), Key::str("z")]);
        let b = Key::composite([Key::int(2), Key::str("a")]);
        assert!(a < b);
    }

    #[test]
    fn prefix_comparison_ignores_trailing_fields() {
        let entry = Key::composite([Key::str("red"), Key::int(7)]);
        assert_eq!(entry.cmp_prefix(&Key::str("red")), Ordering::Equal);
        assert_eq!(entry.cmp_prefix(&Key::str("blue")), Ordering::Greater);
        assert_eq!(entry.cmp_prefix(&Key::str("tan")), Ordering::Less);
    }

    #[test]
    fn recno_stepping_saturates_at_edges() {
        assert_eq!(Key::recno(u64::MAX).next_recno(), None);
        assert_eq!(Key::recno(1).prev_recno(), None);
        assert_eq!(Key::recno(7).next_recno(), Some(Key::recno(8)));
    }

    #[test]
    fn display_strips_fixed_padding() {
        assert_eq!(Key::str("ab\0\0").to_string(), "\"ab\"");
        assert_eq!(Key::bytes(vec![0xff, 0x01]).to_string(), "0xff01");
        assert_eq!(
            Key::composite([Key::int(1), Key::str("x")]).to_string(),
            "(1, \"x\")"
        );
    }
}
