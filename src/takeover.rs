//! Public IP takeover (§6): an idempotent external collaborator invoked at
//! recovery end or whenever `need_takeover_run` is raised.

use std::net::IpAddr;

use crate::common::{NodeMap, Pnn};
use crate::error::Result;

pub trait IpTakeover: Send + Sync {
    /// Reassigns public addresses across `nodemap`'s active members.
    /// Idempotent - calling it again with the same `nodemap` must be a
    /// no-op.
    fn takeover_run(&self, nodemap: &NodeMap) -> Result<()>;

    /// The set of public addresses `pnn` is currently supposed to be
    /// serving, per this collaborator's assignment algorithm. Consulted by
    /// the monitor loop's public-IP sanity check (§4.4 step 7); the
    /// takeover collaborator owns IP ownership, so it is the only
    /// authority for "should serve".
    fn expected_public_ips(&self, nodemap: &NodeMap, pnn: Pnn) -> Vec<IpAddr>;
}

/// A takeover collaborator that does nothing and assigns nothing, for
/// deployments with `public_ip_enabled = false`.
pub struct NullIpTakeover;

impl IpTakeover for NullIpTakeover {
    fn takeover_run(&self, _nodemap: &NodeMap) -> Result<()> { Ok(()) }

    fn expected_public_ips(&self, _nodemap: &NodeMap, _pnn: Pnn) -> Vec<IpAddr> { Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NodeMap;

    #[test]
    fn null_takeover_is_always_ok_and_assigns_nothing() {
        let takeover = NullIpTakeover;
        assert!(takeover.takeover_run(&NodeMap::default()).is_ok());
        assert!(takeover.expected_public_ips(&NodeMap::default(), Pnn(0)).is_empty());
    }
}
