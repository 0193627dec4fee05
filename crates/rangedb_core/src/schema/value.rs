//! Record values and in-place modifications.

use super::key::Key;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer.
    Int(i64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Fixed-width bit field of a fixed-length column store.
    Bits(u8),
    /// Composite value; one entry per column.
    Composite(Vec<Value>),
}

impl Value {
    /// Creates a string value.
    #[must_use]
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Creates a byte value.
    #[must_use]
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(value.into())
    }

    /// Creates a composite value.
    #[must_use]
    pub fn composite(columns: impl IntoIterator<Item = Value>) -> Self {
        Self::Composite(columns.into_iter().collect())
    }

    /// The string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The bit-field payload, if any.
    #[must_use]
    pub fn as_bits(&self) -> Option<u8> {
        match self {
            Self::Bits(b) => Some(*b),
            _ => None,
        }
    }

    /// Approximate payload size in bytes, for statistics.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Int(_) => 8,
            Self::Str(s) => s.len(),
            Self::Bytes(b) => b.len(),
            Self::Bits(_) => 1,
            Self::Composite(cols) => cols.iter().map(Value::size).sum(),
        }
    }

    /// Converts a row-store primary key into the value an index cursor
    /// returns for it.
    #[must_use]
    pub fn from_key(key: &Key) -> Self {
        match key {
            Key::Int(n) => Self::Int(*n),
            Key::Recno(n) => Self::Int(i64::try_from(*n).unwrap_or(i64::MAX)),
            Key::Str(s) => Self::Str(s.clone()),
            Key::Bytes(b) => Self::Bytes(b.clone()),
            Key::Composite(fields) => Self::Composite(fields.iter().map(Self::from_key).collect()),
        }
    }

    /// Extracts the given column as an index key field.
    ///
    /// A scalar value is its own column 0.
    pub fn column_as_key(&self, column: usize) -> CoreResult<Key> {
        let scalar = match self {
            Self::Composite(cols) => cols.get(column).ok_or_else(|| {
                CoreError::invalid_argument(format!("value has no column {column}"))
            })?,
            scalar if column == 0 => scalar,
            _ => {
                return Err(CoreError::invalid_argument(format!(
                    "scalar value has no column {column}"
                )))
            }
        };
        match scalar {
            Self::Int(n) => Ok(Key::Int(*n)),
            Self::Str(s) => Ok(Key::Str(s.clone())),
            Self::Bytes(b) => Ok(Key::Bytes(b.clone())),
            Self::Bits(b) => Ok(Key::Int(i64::from(*b))),
            Self::Composite(_) => Err(CoreError::invalid_argument(
                "nested composite values cannot be indexed",
            )),
        }
    }

    /// Applies a sequence of byte-range edits.
    ///
    /// Only `Bytes` and `Str` values can be modified. Offsets past the end
    /// pad with NUL bytes (or spaces for strings).
    pub fn apply_modifications(&self, mods: &[Modify]) -> CoreResult<Value> {
        match self {
            Self::Bytes(b) => {
                let mut buf = b.clone();
                for m in mods {
                    m.apply(&mut buf, 0);
                }
                Ok(Self::Bytes(buf))
            }
            Self::Str(s) => {
                let mut buf = s.clone().into_bytes();
                for m in mods {
                    m.apply(&mut buf, b' ');
                }
                String::from_utf8(buf).map(Self::Str).map_err(|_| {
                    CoreError::invalid_argument("modification produced an invalid UTF-8 string")
                })
            }
            _ => Err(CoreError::not_supported(
                "modify requires a byte or string value format",
            )),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Bits(b) => write!(f, "{b:#04x}"),
            Self::Composite(cols) => {
                f.write_str("(")?;
                for (i, col) in cols.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{col}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// One byte-range edit applied by `Cursor::modify`.
///
/// Replaces `size` bytes at `offset` with `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modify {
    /// Replacement bytes.
    pub data: Vec<u8>,
    /// Byte offset of the edit.
    pub offset: usize,
    /// Number of existing bytes replaced.
    pub size: usize,
}

impl Modify {
    /// Creates a modification.
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>, offset: usize, size: usize) -> Self {
        Self {
            data: data.into(),
            offset,
            size,
        }
    }

    fn apply(&self, buf: &mut Vec<u8>, pad: u8) {
        if buf.len() < self.offset {
            buf.resize(self.offset, pad);
        }
        let end = self.offset.saturating_add(self.size).min(buf.len());
        buf.splice(self.offset..end, self.data.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modify_replaces_range() {
        let v = Value::bytes(b"abcdef".to_vec());
        let out = v
            .apply_modifications(&[Modify::new(b"XY".to_vec(), 1, 3)])
            .unwrap();
        assert_eq!(out, Value::bytes(b"aXYef".to_vec()));
    }

    #[test]
    fn modify_past_end_pads() {
        let v = Value::bytes(b"ab".to_vec());
        let out = v
            .apply_modifications(&[Modify::new(b"z".to_vec(), 4, 0)])
            .unwrap();
        assert_eq!(out, Value::bytes(b"ab\0\0z".to_vec()));

        let s = Value::str("ab");
        let out = s
            .apply_modifications(&[Modify::new(b"z".to_vec(), 3, 0)])
            .unwrap();
        assert_eq!(out, Value::str("ab z"));
    }

    #[test]
    fn modify_sequence_applies_in_order() {
        let v = Value::str("hello world");
        let out = v
            .apply_modifications(&[
                Modify::new(b"J".to_vec(), 0, 1),
                Modify::new(b"!".to_vec(), 11, 0),
            ])
            .unwrap();
        assert_eq!(out, Value::str("Jello world!"));
    }

    #[test]
    fn modify_rejects_integers() {
        let err = Value::Int(4)
            .apply_modifications(&[Modify::new(vec![1], 0, 1)])
            .unwrap_err();
        assert!(matches!(err, CoreError::NotSupported { .. }));
    }

    #[test]
    fn columns_become_index_fields() {
        let v = Value::composite([Value::str("red"), Value::Int(3)]);
        assert_eq!(v.column_as_key(1).unwrap(), Key::int(3));
        assert!(v.column_as_key(2).is_err());
        assert_eq!(Value::str("x").column_as_key(0).unwrap(), Key::str("x"));
        assert!(Value::str("x").column_as_key(1).is_err());
    }

    #[test]
    fn primary_keys_convert_to_values() {
        assert_eq!(Value::from_key(&Key::int(5)), Value::Int(5));
        assert_eq!(
            Value::from_key(&Key::composite([Key::str("a"), Key::int(1)])),
            Value::composite([Value::str("a"), Value::Int(1)])
        );
    }
}
