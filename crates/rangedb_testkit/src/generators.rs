//! Property-based test generators using proptest.
//!
//! Provides strategies for generating key sets, cursor bounds and cursor
//! operation sequences that maintain required invariants.

use proptest::prelude::*;
use std::collections::BTreeSet;

/// One end of a generated bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenBound {
    /// Bound key.
    pub key: i64,
    /// Whether the key itself is in range.
    pub inclusive: bool,
}

/// A generated pair of bounds; never empty or inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenBounds {
    /// Lower bound.
    pub lower: Option<GenBound>,
    /// Upper bound.
    pub upper: Option<GenBound>,
}

impl GenBounds {
    /// Whether `key` lies inside both bounds.
    pub fn admits(&self, key: i64) -> bool {
        let above_lower = self
            .lower
            .map_or(true, |b| key > b.key || (key == b.key && b.inclusive));
        let below_upper = self
            .upper
            .map_or(true, |b| key < b.key || (key == b.key && b.inclusive));
        above_lower && below_upper
    }
}

/// A cursor operation in a generated sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStep {
    /// `next`.
    Next,
    /// `prev`.
    Prev,
    /// `reset`.
    Reset,
    /// `search` for a key.
    Search(i64),
    /// `search_near` for a key.
    SearchNear(i64),
}

/// Strategy for sets of integer keys in `0..max`.
pub fn key_set_strategy(max: i64, size: usize) -> impl Strategy<Value = BTreeSet<i64>> {
    prop::collection::btree_set(0..max, 0..size)
}

fn bound_strategy(max: i64) -> impl Strategy<Value = Option<GenBound>> {
    prop::option::of((-2..max + 2, any::<bool>()).prop_map(|(key, inclusive)| GenBound { key, inclusive }))
}

/// Strategy for valid bounds over keys in `0..max`.
pub fn bounds_strategy(max: i64) -> impl Strategy<Value = GenBounds> {
    (bound_strategy(max), bound_strategy(max))
        .prop_filter("bounds must form a non-empty interval", |(lower, upper)| {
            match (lower, upper) {
                (Some(l), Some(u)) => l.key < u.key || (l.key == u.key && l.inclusive && u.inclusive),
                _ => true,
            }
        })
        .prop_map(|(lower, upper)| GenBounds { lower, upper })
}

/// Strategy for cursor operation sequences over keys in `0..max`.
pub fn cursor_steps_strategy(max: i64, len: usize) -> impl Strategy<Value = Vec<CursorStep>> {
    let step = prop_oneof![
        4 => Just(CursorStep::Next),
        4 => Just(CursorStep::Prev),
        1 => Just(CursorStep::Reset),
        1 => (-2..max + 2).prop_map(CursorStep::Search),
        1 => (-2..max + 2).prop_map(CursorStep::SearchNear),
    ];
    prop::collection::vec(step, 1..len)
}

/// Strategy for a history of one key: commit timestamps (strictly
/// increasing, starting above zero) paired with a removal flag.
pub fn history_strategy(len: usize) -> impl Strategy<Value = Vec<(u64, bool)>> {
    prop::collection::vec((1u64..10, prop::bool::weighted(0.2)), 1..len).prop_map(|steps| {
        let mut ts = 0;
        steps
            .into_iter()
            .map(|(gap, removed)| {
                ts += gap;
                (ts, removed)
            })
            .collect()
    })
}
