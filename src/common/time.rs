//! Wall-clock helpers.
//!
//! A single monotonic-looking `Timestamp` newtype over milliseconds-since-epoch
//! so ordering comparisons (`priority_time`, ban expiry, culprit grace window)
//! read the same way.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u128);

impl Timestamp {
    pub fn from_millis(millis: u128) -> Self { Timestamp(millis) }

    pub fn as_millis(self) -> u128 { self.0 }

    pub fn elapsed_secs_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0) as u64 / 1000
    }

    pub fn add_secs(self, secs: u64) -> Timestamp { Timestamp(self.0 + secs as u128 * 1000) }
}

/// The current wall-clock time. Centralized so tests can't accidentally
/// call `SystemTime::now()` directly and diverge from the rest of the
/// coordinator's notion of "now".
pub fn now() -> Timestamp {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::from_secs(0));
    Timestamp(d.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_monotonic_with_add_secs() {
        let t0 = Timestamp::from_millis(1_000);
        let t1 = t0.add_secs(5);
        assert_eq!(t1.elapsed_secs_since(t0), 5);
    }
}
