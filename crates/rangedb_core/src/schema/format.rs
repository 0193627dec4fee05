//! Parsing of `key_format`/`value_format` strings and key literals.
//!
//! Format strings use one letter per field, optionally preceded by a count:
//! `S` string, `Ns` fixed-width string, `u` bytes, `b B h H i I l L q Q`
//! integers, `r` record number, `Nt` bit field.

use super::{FieldFormat, Key, KeyFormat, TableFormat, ValueFormat};
use crate::error::{CoreError, CoreResult};
use std::str::FromStr;

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Field(FieldFormat),
    Recno,
    Bits(u8),
}

fn tokenize(fmt_str: &str) -> CoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut count: Option<usize> = None;
    for c in fmt_str.chars() {
        if let Some(d) = c.to_digit(10) {
            let d = d as usize;
            count = Some(
                count
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(d))
                    .ok_or_else(|| CoreError::invalid_argument("format count overflow"))?,
            );
            continue;
        }
        let token = match c {
            'S' => Token::Field(FieldFormat::String),
            's' => Token::Field(FieldFormat::FixedString(count.unwrap_or(1))),
            'u' => Token::Field(FieldFormat::Bytes),
            'b' | 'B' | 'h' | 'H' | 'i' | 'I' | 'l' | 'L' | 'q' | 'Q' => {
                Token::Field(FieldFormat::Int)
            }
            'r' => Token::Recno,
            't' => {
                let bits = count.unwrap_or(1);
                let bits = u8::try_from(bits)
                    .ok()
                    .filter(|b| (1..=8).contains(b))
                    .ok_or_else(|| {
                        CoreError::invalid_argument(format!("bit field width {bits} out of range"))
                    })?;
                Token::Bits(bits)
            }
            other => {
                return Err(CoreError::invalid_argument(format!(
                    "unknown format character '{other}' in \"{fmt_str}\""
                )))
            }
        };
        count = None;
        tokens.push(token);
    }
    if count.is_some() {
        return Err(CoreError::invalid_argument(format!(
            "format \"{fmt_str}\" ends with a dangling count"
        )));
    }
    if tokens.is_empty() {
        return Err(CoreError::invalid_argument("empty format string"));
    }
    Ok(tokens)
}

fn fields_only(tokens: Vec<Token>, fmt_str: &str) -> CoreResult<Vec<FieldFormat>> {
    tokens
        .into_iter()
        .map(|t| match t {
            Token::Field(f) => Ok(f),
            _ => Err(CoreError::invalid_argument(format!(
                "\"{fmt_str}\": record numbers and bit fields cannot be composed"
            ))),
        })
        .collect()
}

impl FromStr for KeyFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = tokenize(s)?;
        if tokens.len() == 1 {
            return match tokens.remove(0) {
                Token::Field(FieldFormat::Int) => Ok(Self::Int),
                Token::Field(FieldFormat::String) => Ok(Self::String),
                Token::Field(FieldFormat::FixedString(w)) => Ok(Self::FixedString(w)),
                Token::Field(FieldFormat::Bytes) => Ok(Self::Bytes),
                Token::Recno => Ok(Self::Recno),
                Token::Bits(_) => Err(CoreError::invalid_argument(
                    "bit fields are not a valid key format",
                )),
            };
        }
        fields_only(tokens, s).map(Self::Composite)
    }
}

impl FromStr for ValueFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = tokenize(s)?;
        if tokens.len() == 1 {
            return match tokens.remove(0) {
                Token::Field(FieldFormat::Int) => Ok(Self::Int),
                Token::Field(FieldFormat::String | FieldFormat::FixedString(_)) => Ok(Self::String),
                Token::Field(FieldFormat::Bytes) => Ok(Self::Bytes),
                Token::Bits(bits) => Ok(Self::Bits(bits)),
                Token::Recno => Err(CoreError::invalid_argument(
                    "record numbers are not a valid value format",
                )),
            };
        }
        fields_only(tokens, s).map(Self::Composite)
    }
}

impl TableFormat {
    /// Builds a table format from `key_format` and `value_format` strings.
    pub fn from_formats(key_format: &str, value_format: &str) -> CoreResult<Self> {
        let key: KeyFormat = key_format.parse()?;
        let value: ValueFormat = value_format.parse()?;
        let format = match (key, value) {
            (KeyFormat::Recno, ValueFormat::Bits(bits)) => Self::FixedColumn { bits },
            (KeyFormat::Recno, value) => Self::VariableColumn { value },
            (key, value) => Self::Row { key, value },
        };
        format.validate()?;
        Ok(format)
    }

    /// Parses a textual key literal (as typed on a command line).
    ///
    /// Integers and record numbers are decimal, byte arrays may be spelled
    /// `0x..` in hex, composite fields are separated by `,`.
    pub fn parse_key(&self, text: &str) -> CoreResult<Key> {
        let key = match self.key_format() {
            KeyFormat::Recno => Key::Recno(parse_number(text)?),
            KeyFormat::Composite(fields) => {
                let parts: Vec<&str> = text.split(',').collect();
                if parts.len() != fields.len() {
                    return Err(CoreError::invalid_argument(format!(
                        "key \"{text}\" needs {} comma-separated fields",
                        fields.len()
                    )));
                }
                Key::Composite(
                    fields
                        .iter()
                        .zip(parts)
                        .map(|(f, p)| parse_field(f, p))
                        .collect::<CoreResult<Vec<_>>>()?,
                )
            }
            KeyFormat::Int => parse_field(&FieldFormat::Int, text)?,
            KeyFormat::String => parse_field(&FieldFormat::String, text)?,
            KeyFormat::FixedString(w) => parse_field(&FieldFormat::FixedString(w), text)?,
            KeyFormat::Bytes => parse_field(&FieldFormat::Bytes, text)?,
        };
        self.normalize_key(key)
    }
}

fn parse_number<T: FromStr>(text: &str) -> CoreResult<T> {
    text.trim()
        .parse()
        .map_err(|_| CoreError::invalid_argument(format!("\"{text}\" is not a number")))
}

fn parse_field(format: &FieldFormat, text: &str) -> CoreResult<Key> {
    match format {
        FieldFormat::Int => Ok(Key::Int(parse_number(text)?)),
        FieldFormat::String | FieldFormat::FixedString(_) => Ok(Key::Str(text.to_string())),
        FieldFormat::Bytes => match text.strip_prefix("0x") {
            Some(hex) => decode_hex(hex).map(Key::Bytes),
            None => Ok(Key::Bytes(text.as_bytes().to_vec())),
        },
    }
}

fn decode_hex(hex: &str) -> CoreResult<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(CoreError::invalid_argument("hex key has odd length"));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CoreError::invalid_argument(format!("bad hex in key \"{hex}\"")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_formats() {
        assert_eq!("S".parse::<KeyFormat>().unwrap(), KeyFormat::String);
        assert_eq!("10s".parse::<KeyFormat>().unwrap(), KeyFormat::FixedString(10));
        assert_eq!("q".parse::<KeyFormat>().unwrap(), KeyFormat::Int);
        assert_eq!("r".parse::<KeyFormat>().unwrap(), KeyFormat::Recno);
        assert_eq!("8t".parse::<ValueFormat>().unwrap(), ValueFormat::Bits(8));
    }

    #[test]
    fn composite_formats() {
        assert_eq!(
            "Si".parse::<KeyFormat>().unwrap(),
            KeyFormat::Composite(vec![FieldFormat::String, FieldFormat::Int])
        );
        assert!("Sr".parse::<KeyFormat>().is_err());
        assert!("x".parse::<KeyFormat>().is_err());
        assert!("5".parse::<KeyFormat>().is_err());
        assert!("9t".parse::<ValueFormat>().is_err());
    }

    #[test]
    fn table_kind_follows_formats() {
        assert_eq!(
            TableFormat::from_formats("r", "8t").unwrap(),
            TableFormat::FixedColumn { bits: 8 }
        );
        assert_eq!(
            TableFormat::from_formats("r", "S").unwrap(),
            TableFormat::VariableColumn {
                value: ValueFormat::String
            }
        );
        assert!(TableFormat::from_formats("S", "8t").is_err());
    }

    #[test]
    fn key_literals() {
        let ints = TableFormat::from_formats("i", "S").unwrap();
        assert_eq!(ints.parse_key("-4").unwrap(), Key::int(-4));
        assert!(ints.parse_key("four").is_err());

        let bytes = TableFormat::from_formats("u", "S").unwrap();
        assert_eq!(bytes.parse_key("0xff00").unwrap(), Key::bytes(vec![0xff, 0]));
        assert_eq!(bytes.parse_key("ab").unwrap(), Key::bytes(b"ab".to_vec()));

        let fixed = TableFormat::from_formats("3s", "S").unwrap();
        assert_eq!(fixed.parse_key("a").unwrap(), Key::str("a\0\0"));

        let composite = TableFormat::from_formats("Si", "S").unwrap();
        assert_eq!(
            composite.parse_key("x,2").unwrap(),
            Key::composite([Key::str("x"), Key::int(2)])
        );
    }
}
