//! Global oldest and stable timestamps.

use crate::config::TimestampConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Values of the global clocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clocks {
    /// Earliest timestamp readers may still ask for.
    pub oldest: Timestamp,
    /// Durability horizon.
    pub stable: Timestamp,
    /// Stable timestamp of the last checkpoint.
    pub last_checkpoint: Timestamp,
}

/// The process-wide clocks. Both only move forward and `oldest <= stable`.
#[derive(Debug, Default)]
pub struct GlobalClock {
    inner: RwLock<Clocks>,
}

impl GlobalClock {
    /// Creates clocks starting at `clocks`.
    #[must_use]
    pub fn new(clocks: Clocks) -> Self {
        Self {
            inner: RwLock::new(clocks),
        }
    }

    /// Current values.
    #[must_use]
    pub fn get(&self) -> Clocks {
        *self.inner.read()
    }

    /// Advances the clocks. Returns whether `oldest` moved.
    ///
    /// Both updates are validated together and applied only if every check
    /// passes.
    pub fn set(&self, config: &TimestampConfig) -> CoreResult<bool> {
        let mut clocks = self.inner.write();
        let oldest = config.oldest_timestamp.unwrap_or(clocks.oldest);
        let stable = config.stable_timestamp.unwrap_or(clocks.stable);

        for (name, requested, current) in [
            ("oldest", config.oldest_timestamp, clocks.oldest),
            ("stable", config.stable_timestamp, clocks.stable),
        ] {
            let Some(requested) = requested else {
                continue;
            };
            if requested.is_none() {
                return Err(CoreError::invalid_argument(format!(
                    "{name} timestamp must not be zero"
                )));
            }
            if requested < current {
                tracing::debug!(%requested, %current, "rejected {name} timestamp retreat");
                return Err(CoreError::invalid_argument(format!(
                    "{name} timestamp {requested} is older than the current {current}"
                )));
            }
        }
        if !stable.is_none() && oldest > stable {
            return Err(CoreError::invalid_argument(format!(
                "oldest timestamp {oldest} is newer than stable timestamp {stable}"
            )));
        }

        let advanced = oldest > clocks.oldest;
        clocks.oldest = oldest;
        clocks.stable = stable;
        Ok(advanced)
    }

    pub(crate) fn set_last_checkpoint(&self, ts: Timestamp) {
        self.inner.write().last_checkpoint = ts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(n: u64) -> Timestamp {
        Timestamp::new(n)
    }

    #[test]
    fn clocks_advance() {
        let clock = GlobalClock::default();
        assert!(clock.set(&TimestampConfig::new().oldest(ts(5)).stable(ts(10))).unwrap());
        assert!(!clock.set(&TimestampConfig::new().stable(ts(20))).unwrap());
        let clocks = clock.get();
        assert_eq!(clocks.oldest, ts(5));
        assert_eq!(clocks.stable, ts(20));
    }

    #[test]
    fn retreat_is_rejected() {
        let clock = GlobalClock::default();
        clock.set(&TimestampConfig::new().oldest(ts(5)).stable(ts(10))).unwrap();
        assert!(clock.set(&TimestampConfig::new().stable(ts(9))).is_err());
        assert!(clock.set(&TimestampConfig::new().oldest(ts(4))).is_err());
        assert_eq!(clock.get().stable, ts(10));
    }

    #[test]
    fn oldest_past_stable_is_rejected() {
        let clock = GlobalClock::default();
        clock.set(&TimestampConfig::new().stable(ts(10))).unwrap();
        let err = clock.set(&TimestampConfig::new().oldest(ts(11))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        assert_eq!(clock.get().oldest, Timestamp::NONE);
    }

    #[test]
    fn zero_is_rejected() {
        let clock = GlobalClock::default();
        assert!(clock.set(&TimestampConfig::new().stable(Timestamp::NONE)).is_err());
    }

    #[test]
    fn same_value_is_not_a_retreat() {
        let clock = GlobalClock::default();
        clock.set(&TimestampConfig::new().oldest(ts(3)).stable(ts(3))).unwrap();
        assert!(!clock.set(&TimestampConfig::new().oldest(ts(3)).stable(ts(3))).unwrap());
    }
}
