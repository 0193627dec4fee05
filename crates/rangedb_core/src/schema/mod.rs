//! Table schemas.
//!
//! Every key and value entering a table passes through its [`TableFormat`],
//! which rejects mismatched shapes and normalizes the rest (fixed-width
//! strings are NUL-padded, bit fields are masked). All comparisons inside
//! the engine are over normalized keys.

mod format;
mod key;
mod value;

pub use key::Key;
pub use value::{Modify, Value};

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Format of one field of a composite key or value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldFormat {
    /// Signed 64-bit integer.
    Int,
    /// Variable-length string.
    String,
    /// String padded with NUL bytes to a fixed width.
    FixedString(usize),
    /// Byte array.
    Bytes,
}

/// Format of a table key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyFormat {
    /// Signed 64-bit integer.
    Int,
    /// Variable-length string.
    String,
    /// String padded with NUL bytes to a fixed width.
    FixedString(usize),
    /// Byte array.
    Bytes,
    /// Several fields compared in order.
    Composite(Vec<FieldFormat>),
    /// Record number of a column store.
    Recno,
}

/// Format of a table value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueFormat {
    /// Signed 64-bit integer.
    Int,
    /// Variable-length string.
    String,
    /// Byte array.
    Bytes,
    /// Fixed-width bit field (fixed-length column stores only).
    Bits(u8),
    /// Several columns.
    Composite(Vec<FieldFormat>),
}

impl ValueFormat {
    /// The field format of one column, used to type index keys.
    pub fn column_format(&self, column: usize) -> CoreResult<FieldFormat> {
        let missing = || CoreError::invalid_argument(format!("value format has no column {column}"));
        match self {
            Self::Composite(fields) => fields.get(column).cloned().ok_or_else(missing),
            _ if column != 0 => Err(missing()),
            Self::Int | Self::Bits(_) => Ok(FieldFormat::Int),
            Self::String => Ok(FieldFormat::String),
            Self::Bytes => Ok(FieldFormat::Bytes),
        }
    }
}

/// Storage layout and formats of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableFormat {
    /// Row store with an arbitrary key format.
    Row {
        /// Key format.
        key: KeyFormat,
        /// Value format.
        value: ValueFormat,
    },
    /// Variable-length column store keyed by record number.
    VariableColumn {
        /// Value format.
        value: ValueFormat,
    },
    /// Fixed-length column store; values are `bits` wide and deleted or
    /// missing records below the table end read as zero.
    FixedColumn {
        /// Bit width of each value, 1 to 8.
        bits: u8,
    },
}

impl TableFormat {
    /// A row store.
    #[must_use]
    pub fn row(key: KeyFormat, value: ValueFormat) -> Self {
        Self::Row { key, value }
    }

    /// A variable-length column store.
    #[must_use]
    pub fn variable_column(value: ValueFormat) -> Self {
        Self::VariableColumn { value }
    }

    /// A fixed-length column store.
    #[must_use]
    pub const fn fixed_column(bits: u8) -> Self {
        Self::FixedColumn { bits }
    }

    /// Checks that the format is internally consistent.
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            Self::Row { key, value } => {
                if *key == KeyFormat::Recno {
                    return Err(CoreError::invalid_argument(
                        "record-number keys require a column store",
                    ));
                }
                if let KeyFormat::FixedString(0) = key {
                    return Err(CoreError::invalid_argument("fixed string width must be positive"));
                }
                if let ValueFormat::Bits(_) = value {
                    return Err(CoreError::invalid_argument(
                        "bit-field values require a fixed-length column store",
                    ));
                }
                Ok(())
            }
            Self::VariableColumn { value } => match value {
                ValueFormat::Bits(_) => Err(CoreError::invalid_argument(
                    "bit-field values require a fixed-length column store",
                )),
                _ => Ok(()),
            },
            Self::FixedColumn { bits } if (1..=8).contains(bits) => Ok(()),
            Self::FixedColumn { bits } => Err(CoreError::invalid_argument(format!(
                "fixed-length column width must be 1 to 8 bits, got {bits}"
            ))),
        }
    }

    /// The key format; column stores are keyed by record number.
    #[must_use]
    pub fn key_format(&self) -> KeyFormat {
        match self {
            Self::Row { key, .. } => key.clone(),
            _ => KeyFormat::Recno,
        }
    }

    /// The value format.
    #[must_use]
    pub fn value_format(&self) -> ValueFormat {
        match self {
            Self::Row { value, .. } | Self::VariableColumn { value } => value.clone(),
            Self::FixedColumn { bits } => ValueFormat::Bits(*bits),
        }
    }

    /// Whether this is a fixed-length column store.
    #[must_use]
    pub const fn is_fixed_column(&self) -> bool {
        matches!(self, Self::FixedColumn { .. })
    }

    /// Whether keys are record numbers.
    #[must_use]
    pub const fn is_column_store(&self) -> bool {
        !matches!(self, Self::Row { .. })
    }

    /// The value a fixed-length column store returns for deleted records.
    #[must_use]
    pub const fn zero_value(&self) -> Option<Value> {
        match self {
            Self::FixedColumn { .. } => Some(Value::Bits(0)),
            _ => None,
        }
    }

    /// Checks a key against the key format and returns its normalized form.
    pub fn normalize_key(&self, key: Key) -> CoreResult<Key> {
        normalize_key(&self.key_format(), key)
    }

    /// Reverses fixed-width padding for keys returned to callers.
    #[must_use]
    pub fn present_key(&self, key: &Key) -> Key {
        present(key)
    }

    /// Checks a value against the value format and returns its normalized form.
    pub fn normalize_value(&self, value: Value) -> CoreResult<Value> {
        normalize_value(&self.value_format(), value)
    }
}

pub(crate) fn normalize_key(format: &KeyFormat, key: Key) -> CoreResult<Key> {
    match (format, key) {
        (KeyFormat::Recno, Key::Recno(n)) if n > 0 => Ok(Key::Recno(n)),
        (KeyFormat::Recno, Key::Int(n)) if n > 0 => Ok(Key::Recno(n.unsigned_abs())),
        (KeyFormat::Recno, Key::Recno(_) | Key::Int(_)) => {
            Err(CoreError::invalid_argument("record numbers start at 1"))
        }
        (KeyFormat::Int, key) => normalize_field(&FieldFormat::Int, key),
        (KeyFormat::String, key) => normalize_field(&FieldFormat::String, key),
        (KeyFormat::FixedString(w), key) => normalize_field(&FieldFormat::FixedString(*w), key),
        (KeyFormat::Bytes, key) => normalize_field(&FieldFormat::Bytes, key),
        (KeyFormat::Composite(fields), Key::Composite(parts)) => {
            if parts.len() != fields.len() {
                return Err(CoreError::invalid_argument(format!(
                    "composite key has {} fields, format expects {}",
                    parts.len(),
                    fields.len()
                )));
            }
            fields
                .iter()
                .zip(parts)
                .map(|(f, k)| normalize_field(f, k))
                .collect::<CoreResult<Vec<_>>>()
                .map(Key::Composite)
        }
        (format, key) => Err(mismatch("key", format, &key)),
    }
}

/// Normalizes a bound on the leading `1..=fields.len()` columns of an index.
pub(crate) fn normalize_prefix(fields: &[FieldFormat], key: Key) -> CoreResult<Key> {
    let parts = match key {
        Key::Composite(parts) => parts,
        scalar => vec![scalar],
    };
    if parts.is_empty() || parts.len() > fields.len() {
        return Err(CoreError::invalid_argument(format!(
            "index key has {} fields, index has {} columns",
            parts.len(),
            fields.len()
        )));
    }
    fields
        .iter()
        .zip(parts)
        .map(|(f, k)| normalize_field(f, k))
        .collect::<CoreResult<Vec<_>>>()
        .map(Key::Composite)
}

fn normalize_field(format: &FieldFormat, key: Key) -> CoreResult<Key> {
    match (format, key) {
        (FieldFormat::Int, k @ Key::Int(_)) => Ok(k),
        (FieldFormat::String, k @ Key::Str(_)) => Ok(k),
        (FieldFormat::Bytes, k @ Key::Bytes(_)) => Ok(k),
        (FieldFormat::FixedString(width), Key::Str(s)) => pad_fixed(s, *width).map(Key::Str),
        (format, key) => Err(CoreError::invalid_argument(format!(
            "key field {key} does not match format {format:?}"
        ))),
    }
}

fn pad_fixed(mut s: String, width: usize) -> CoreResult<String> {
    if s.len() > width {
        if !s.is_char_boundary(width) {
            return Err(CoreError::invalid_argument(format!(
                "fixed-width string cannot be cut at byte {width}"
            )));
        }
        s.truncate(width);
    }
    while s.len() < width {
        s.push('\0');
    }
    Ok(s)
}

fn present(key: &Key) -> Key {
    match key {
        Key::Str(s) => Key::Str(s.trim_end_matches('\0').to_string()),
        Key::Composite(parts) => Key::Composite(parts.iter().map(present).collect()),
        other => other.clone(),
    }
}

fn normalize_value(format: &ValueFormat, value: Value) -> CoreResult<Value> {
    match (format, value) {
        (ValueFormat::Int, v @ Value::Int(_)) => Ok(v),
        (ValueFormat::String, v @ Value::Str(_)) => Ok(v),
        (ValueFormat::Bytes, v @ Value::Bytes(_)) => Ok(v),
        (ValueFormat::Bits(bits), Value::Bits(b)) => Ok(Value::Bits(b & bit_mask(*bits))),
        (ValueFormat::Bits(bits), Value::Int(n)) => {
            let b = u8::try_from(n & 0xff).unwrap_or(0);
            Ok(Value::Bits(b & bit_mask(*bits)))
        }
        (ValueFormat::Composite(fields), Value::Composite(cols)) => {
            if cols.len() != fields.len() {
                return Err(CoreError::invalid_argument(format!(
                    "composite value has {} columns, format expects {}",
                    cols.len(),
                    fields.len()
                )));
            }
            fields
                .iter()
                .zip(cols)
                .map(|(f, v)| match (f, v) {
                    (FieldFormat::Int, v @ Value::Int(_)) => Ok(v),
                    (FieldFormat::String, v @ Value::Str(_)) => Ok(v),
                    (FieldFormat::Bytes, v @ Value::Bytes(_)) => Ok(v),
                    (FieldFormat::FixedString(w), Value::Str(s)) => pad_fixed(s, *w).map(Value::Str),
                    (f, v) => Err(CoreError::invalid_argument(format!(
                        "value column {v} does not match format {f:?}"
                    ))),
                })
                .collect::<CoreResult<Vec<_>>>()
                .map(Value::Composite)
        }
        (format, value) => Err(CoreError::invalid_argument(format!(
            "value {value} does not match value format {format:?}"
        ))),
    }
}

const fn bit_mask(bits: u8) -> u8 {
    if bits >= 8 {
        u8::MAX
    } else {
        (1u8 << bits) - 1
    }
}

fn mismatch(what: &str, format: &KeyFormat, key: &Key) -> CoreError {
    CoreError::invalid_argument(format!("{what} {key} does not match format {format:?}"))
}
