//! Key intervals restricting a cursor.

use crate::config::BoundKind;
use crate::error::{CoreError, CoreResult};
use crate::schema::Key;
use std::cmp::Ordering;
use std::ops::Bound;

/// One end of a cursor's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBound {
    /// Normalized bound key.
    pub key: Key,
    /// Whether the bound key itself is in range.
    pub inclusive: bool,
}

/// The lower and upper bound of a cursor.
///
/// Index cursors compare only the leading index columns against the bound,
/// so an index entry `(x, pk)` matches a bound on `x` whatever its primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bounds {
    lower: Option<KeyBound>,
    upper: Option<KeyBound>,
    prefix: bool,
}

impl Bounds {
    /// Unbounded range over full keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unbounded range whose keys are compared by leading fields.
    #[must_use]
    pub fn prefix() -> Self {
        Self {
            prefix: true,
            ..Self::default()
        }
    }

    /// Lower bound, if set.
    #[must_use]
    pub fn lower(&self) -> Option<&KeyBound> {
        self.lower.as_ref()
    }

    /// Upper bound, if set.
    #[must_use]
    pub fn upper(&self) -> Option<&KeyBound> {
        self.upper.as_ref()
    }

    /// Whether any bound is set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lower.is_some() || self.upper.is_some()
    }

    /// Compares a record key with a bound key.
    #[must_use]
    pub fn compare(&self, key: &Key, bound: &Key) -> Ordering {
        if self.prefix {
            key.cmp_prefix(bound)
        } else {
            key.cmp(bound)
        }
    }

    /// Whether `key` lies before the lower bound.
    #[must_use]
    pub fn below_lower(&self, key: &Key) -> bool {
        self.lower.as_ref().map_or(false, |b| {
            match self.compare(key, &b.key) {
                Ordering::Less => true,
                Ordering::Equal => !b.inclusive,
                Ordering::Greater => false,
            }
        })
    }

    /// Whether `key` lies past the upper bound.
    #[must_use]
    pub fn above_upper(&self, key: &Key) -> bool {
        self.upper.as_ref().map_or(false, |b| {
            match self.compare(key, &b.key) {
                Ordering::Greater => true,
                Ordering::Equal => !b.inclusive,
                Ordering::Less => false,
            }
        })
    }

    /// Whether `key` is inside the range.
    #[must_use]
    pub fn admits(&self, key: &Key) -> bool {
        !self.below_lower(key) && !self.above_upper(key)
    }

    /// Where a forward scan of the whole range starts. Keys equal to an
    /// exclusive bound are still visited and must be skipped.
    #[must_use]
    pub fn forward_start(&self) -> Bound<&Key> {
        self.lower
            .as_ref()
            .map_or(Bound::Unbounded, |b| Bound::Included(&b.key))
    }

    /// Where a backward scan of the whole range starts. Prefix bounds sort
    /// before the entries they match, so those scans start at the end.
    #[must_use]
    pub fn backward_start(&self) -> Bound<&Key> {
        match &self.upper {
            Some(b) if !self.prefix => Bound::Included(&b.key),
            _ => Bound::Unbounded,
        }
    }

    /// Returns these bounds with one end replaced, or an error if the
    /// result would be an empty or inverted interval.
    pub fn with(&self, kind: BoundKind, bound: KeyBound) -> CoreResult<Self> {
        let mut next = self.clone();
        match kind {
            BoundKind::Lower => next.lower = Some(bound),
            BoundKind::Upper => next.upper = Some(bound),
        }
        if let (Some(lower), Some(upper)) = (&next.lower, &next.upper) {
            match lower.key.cmp(&upper.key) {
                Ordering::Greater => {
                    return Err(CoreError::invalid_argument(format!(
                        "lower bound {} is greater than upper bound {}",
                        lower.key, upper.key
                    )))
                }
                Ordering::Equal if !(lower.inclusive && upper.inclusive) => {
                    return Err(CoreError::invalid_argument(
                        "equal bounds must both be inclusive",
                    ))
                }
                _ => {}
            }
        }
        Ok(next)
    }

    /// Removes both bounds.
    pub fn clear(&mut self) {
        self.lower = None;
        self.upper = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bound(key: i64, inclusive: bool) -> KeyBound {
        KeyBound {
            key: Key::int(key),
            inclusive,
        }
    }

    #[test]
    fn inclusive_and_exclusive_ends() {
        let b = Bounds::new()
            .with(BoundKind::Lower, bound(10, true))
            .unwrap()
            .with(BoundKind::Upper, bound(20, false))
            .unwrap();
        assert!(b.below_lower(&Key::int(9)));
        assert!(b.admits(&Key::int(10)));
        assert!(b.admits(&Key::int(19)));
        assert!(b.above_upper(&Key::int(20)));
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let b = Bounds::new().with(BoundKind::Lower, bound(10, true)).unwrap();
        assert!(b.with(BoundKind::Upper, bound(5, true)).is_err());
        assert!(b.with(BoundKind::Upper, bound(10, false)).is_err());
        assert!(b.with(BoundKind::Upper, bound(10, true)).is_ok());
        // The failed attempts left the original untouched.
        assert!(b.upper().is_none());
    }

    #[test]
    fn prefix_bounds_match_leading_fields() {
        let b = Bounds::prefix()
            .with(
                BoundKind::Lower,
                KeyBound {
                    key: Key::composite([Key::str("m")]),
                    inclusive: false,
                },
            )
            .unwrap();
        let entry = |s: &str, pk: i64| Key::composite([Key::str(s), Key::int(pk)]);
        assert!(b.below_lower(&entry("m", 1)));
        assert!(b.below_lower(&entry("m", 99)));
        assert!(b.admits(&entry("n", 0)));
        assert!(matches!(b.backward_start(), Bound::Unbounded));
    }

    #[test]
    fn all_max_bytes_upper_excludes_itself() {
        let max = Key::bytes(vec![0xff; 4]);
        let b = Bounds::new()
            .with(
                BoundKind::Upper,
                KeyBound {
                    key: max.clone(),
                    inclusive: false,
                },
            )
            .unwrap();
        assert!(b.above_upper(&max));
        assert!(b.admits(&Key::bytes(vec![0xff, 0xff, 0xff, 0xfe])));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut b = Bounds::new().with(BoundKind::Lower, bound(1, true)).unwrap();
        b.clear();
        let once = b.clone();
        b.clear();
        assert_eq!(b, once);
        assert!(!b.is_active());
    }

    proptest! {
        #[test]
        fn admits_matches_interval(
            lo in -50i64..50,
            width in 0i64..50,
            lo_inc in any::<bool>(),
            hi_inc in any::<bool>(),
            key in -100i64..100,
        ) {
            let hi = lo + width;
            prop_assume!(width > 0 || (lo_inc && hi_inc));
            let b = Bounds::new()
                .with(BoundKind::Lower, bound(lo, lo_inc)).unwrap()
                .with(BoundKind::Upper, bound(hi, hi_inc)).unwrap();
            let expected = (key > lo || (key == lo && lo_inc)) && (key < hi || (key == hi && hi_inc));
            prop_assert_eq!(b.admits(&Key::int(key)), expected);
        }
    }
}
