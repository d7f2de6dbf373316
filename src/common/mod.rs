//! Shared data model: node identifiers, flags, node/vnn/db maps, and the
//! small wire-serialization helpers used by the event dispatcher.

pub mod dbmap;
pub mod flags;
pub mod node;
pub mod time;
pub mod vnnmap;
pub mod wire;

pub use dbmap::{DbEntry, DbMap};
pub use flags::NodeFlags;
pub use node::{Node, NodeMap, Pnn};
pub use time::{now, Timestamp};
pub use vnnmap::{new_generation, VnnMap, INVALID_GENERATION};

/// Recovery mode, replicated on every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    Normal,
    Active,
}

/// The lattice used to aggregate the result of a fan-out across peers.
/// Ordering matters: the aggregate of a fan-out is the *most severe*
/// per-peer result, and `RecoveryNeeded` dominates `ElectionNeeded` which
/// dominates `Failed` which dominates `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MonitorResult {
    Ok,
    Failed,
    ElectionNeeded,
    RecoveryNeeded,
}

impl MonitorResult {
    /// Combine two results, keeping the more severe one.
    pub fn merge(self, other: MonitorResult) -> MonitorResult { self.max(other) }
}

impl Default for MonitorResult {
    fn default() -> Self { MonitorResult::Ok }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_result_ordering_matches_severity() {
        assert!(MonitorResult::RecoveryNeeded > MonitorResult::ElectionNeeded);
        assert!(MonitorResult::ElectionNeeded > MonitorResult::Failed);
        assert!(MonitorResult::Failed > MonitorResult::Ok);
    }

    #[test]
    fn merge_keeps_most_severe() {
        let mut acc = MonitorResult::Ok;
        acc = acc.merge(MonitorResult::Failed);
        acc = acc.merge(MonitorResult::Ok);
        assert_eq!(acc, MonitorResult::Failed);
        acc = acc.merge(MonitorResult::RecoveryNeeded);
        acc = acc.merge(MonitorResult::ElectionNeeded);
        assert_eq!(acc, MonitorResult::RecoveryNeeded);
    }
}
