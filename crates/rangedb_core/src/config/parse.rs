//! Parser for `key=value,key=(nested,list)` option strings.

use crate::error::{CoreError, CoreResult};
use crate::types::{PreparedId, Timestamp};

/// One `key=value` item. A bare `key` is read as `key=true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Item {
    pub key: String,
    pub value: String,
}

impl Item {
    pub fn bool(&self) -> CoreResult<bool> {
        match self.value.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(self.bad("a boolean")),
        }
    }

    /// Timestamps are spelled in hexadecimal.
    pub fn timestamp(&self) -> CoreResult<Timestamp> {
        Timestamp::from_hex(&self.value).ok_or_else(|| self.bad("a hexadecimal timestamp"))
    }

    pub fn prepared_id(&self) -> CoreResult<PreparedId> {
        self.value
            .parse()
            .map(PreparedId::new)
            .map_err(|_| self.bad("a decimal id"))
    }

    pub fn isolation(&self) -> CoreResult<super::Isolation> {
        match self.value.as_str() {
            "snapshot" => Ok(super::Isolation::Snapshot),
            "read-committed" | "read_committed" => Ok(super::Isolation::ReadCommitted),
            _ => Err(self.bad("snapshot or read-committed")),
        }
    }

    pub fn usize(&self) -> CoreResult<usize> {
        self.value.parse().map_err(|_| self.bad("a decimal number"))
    }

    pub fn string(&self) -> CoreResult<String> {
        if self.value.is_empty() {
            return Err(self.bad("a non-empty string"));
        }
        Ok(self.value.clone())
    }

    pub fn unknown(&self) -> CoreError {
        CoreError::invalid_argument(format!("unknown configuration key \"{}\"", self.key))
    }

    pub fn bad(&self, expected: &str) -> CoreError {
        CoreError::invalid_argument(format!(
            "configuration \"{}={}\": expected {expected}",
            self.key, self.value
        ))
    }
}

/// Splits an option string into items, honouring parenthesised nesting
/// and double-quoted values.
pub(crate) fn parse_items(config: &str) -> CoreResult<Vec<Item>> {
    let mut items = Vec::new();
    for raw in split_top_level(config)? {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (key, value) = match raw.split_once('=') {
            Some((k, v)) => (k.trim(), unwrap_value(v.trim())),
            None => (raw, "true"),
        };
        if key.is_empty() {
            return Err(CoreError::invalid_argument(format!(
                "configuration item \"{raw}\" has no key"
            )));
        }
        items.push(Item {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(items)
}

fn split_top_level(config: &str) -> CoreResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in config.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' | '[' if !quoted => depth += 1,
            ')' | ']' if !quoted => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    CoreError::invalid_argument(format!("unbalanced brackets in \"{config}\""))
                })?;
            }
            ',' if depth == 0 && !quoted => {
                parts.push(&config[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quoted {
        return Err(CoreError::invalid_argument(format!(
            "unterminated bracket or quote in \"{config}\""
        )));
    }
    parts.push(&config[start..]);
    Ok(parts)
}

fn unwrap_value(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'(' && last == b')')
            || (first == b'[' && last == b']')
            || (first == b'"' && last == b'"')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_items() {
        let items = parse_items("read_timestamp=1e,ignore_prepare=true").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "read_timestamp");
        assert_eq!(items[0].timestamp().unwrap(), Timestamp::new(0x1e));
        assert!(items[1].bool().unwrap());
    }

    #[test]
    fn bare_key_means_true() {
        let items = parse_items("overwrite").unwrap();
        assert!(items[0].bool().unwrap());
    }

    #[test]
    fn nested_values_stay_whole() {
        let items = parse_items("name=ckpt,target=(\"table:a\",\"table:b\"),x=\"a,b\"").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].value, "\"table:a\",\"table:b\"");
        assert_eq!(items[2].value, "a,b");
    }

    #[test]
    fn malformed_strings_are_rejected() {
        assert!(parse_items("a=(1,2").is_err());
        assert!(parse_items("a=1)").is_err());
        assert!(parse_items("=3").is_err());
        let items = parse_items("flag=maybe").unwrap();
        assert!(items[0].bool().is_err());
    }

    #[test]
    fn empty_string_has_no_items() {
        assert!(parse_items("").unwrap().is_empty());
        assert!(parse_items(" , ").unwrap().is_empty());
    }
}
