//! An in-memory cluster of mock peers, used by unit tests throughout the
//! crate and by the integration tests under `tests/`. Exposed outside
//! `#[cfg(test)]` behind the `test-support` feature so integration tests
//! can assemble a multi-node fleet in one process.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use crate::common::{DbEntry, DbMap, NodeFlags, NodeMap, Pnn, RecoveryMode, VnnMap};
use crate::config::Tunables;
use crate::error::{RecoveryError, Result};

use super::client::{Destination, PeerClient, Srvid};

#[derive(Debug, Clone)]
pub struct MockNodeState {
    pub nodemap: NodeMap,
    pub vnnmap: VnnMap,
    pub dbmap: DbMap,
    pub recmaster: Option<Pnn>,
    pub recmode: RecoveryMode,
    pub max_rsn: HashMap<u32, u64>,
    pub public_ips: Vec<IpAddr>,
    pub tunables: Tunables,
    pub frozen: bool,
    /// Simulates transport-level unreachability, independent of the
    /// `DISCONNECTED` flag carried in the node map.
    pub reachable: bool,
}

impl MockNodeState {
    pub fn new(nodemap: NodeMap, vnnmap: VnnMap, dbmap: DbMap, tunables: Tunables) -> Self {
        MockNodeState {
            nodemap,
            vnnmap,
            dbmap,
            recmaster: None,
            recmode: RecoveryMode::Normal,
            max_rsn: HashMap::new(),
            public_ips: Vec::new(),
            tunables,
            frozen: false,
            reachable: true,
        }
    }
}

#[derive(Clone)]
pub struct MockCluster {
    nodes: Arc<Mutex<HashMap<Pnn, MockNodeState>>>,
    messages: Arc<Mutex<Vec<(Destination, Srvid, Vec<u8>)>>>,
}

impl Default for MockCluster {
    fn default() -> Self { Self::new() }
}

impl MockCluster {
    pub fn new() -> Self {
        MockCluster { nodes: Arc::new(Mutex::new(HashMap::new())), messages: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn insert(&self, pnn: Pnn, state: MockNodeState) { self.nodes.lock().unwrap().insert(pnn, state); }

    pub fn with_node<T>(&self, pnn: Pnn, f: impl FnOnce(&MockNodeState) -> T) -> Option<T> {
        self.nodes.lock().unwrap().get(&pnn).map(f)
    }

    pub fn with_node_mut<T>(&self, pnn: Pnn, f: impl FnOnce(&mut MockNodeState) -> T) -> Option<T> {
        self.nodes.lock().unwrap().get_mut(&pnn).map(f)
    }

    pub fn set_reachable(&self, pnn: Pnn, reachable: bool) {
        self.with_node_mut(pnn, |n| n.reachable = reachable);
    }

    /// Flip `flag` on node `pnn`, as observed in *every* node's copy of the
    /// node map (used to simulate a `DISCONNECTED` observation becoming
    /// locally visible everywhere but `pnn` itself, or a cluster-wide
    /// `BANNED`/`DISABLED` change).
    pub fn set_flag_everywhere(&self, pnn: Pnn, flag: NodeFlags, set: bool) {
        let mut nodes = self.nodes.lock().unwrap();
        for state in nodes.values_mut() {
            if let Some(n) = state.nodemap.get_mut(pnn) {
                n.flags.set(flag, set);
            }
        }
    }

    pub fn drained_messages(&self) -> Vec<(Destination, Srvid, Vec<u8>)> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }

    pub fn client(&self) -> MockPeerClient { MockPeerClient { cluster: self.clone() } }
}

pub struct MockPeerClient {
    cluster: MockCluster,
}

impl MockPeerClient {
    fn require(&self, target: Pnn) -> Result<()> {
        let reachable = self.cluster.with_node(target, |n| n.reachable).unwrap_or(false);
        if reachable {
            Ok(())
        } else {
            Err(RecoveryError::TransientRpc { pnn: target, reason: "peer unreachable".into() })
        }
    }

    fn missing(target: Pnn) -> RecoveryError {
        RecoveryError::TransientRpc { pnn: target, reason: "unknown peer".into() }
    }
}

impl PeerClient for MockPeerClient {
    fn get_pnn(&self, target: Pnn) -> Result<Pnn> {
        self.require(target)?;
        Ok(target)
    }

    fn get_nodemap(&self, target: Pnn) -> Result<NodeMap> {
        self.require(target)?;
        self.cluster.with_node(target, |n| n.nodemap.clone()).ok_or_else(|| Self::missing(target))
    }

    fn get_vnnmap(&self, target: Pnn) -> Result<VnnMap> {
        self.require(target)?;
        self.cluster.with_node(target, |n| n.vnnmap.clone()).ok_or_else(|| Self::missing(target))
    }

    fn get_dbmap(&self, target: Pnn) -> Result<DbMap> {
        self.require(target)?;
        self.cluster.with_node(target, |n| n.dbmap.clone()).ok_or_else(|| Self::missing(target))
    }

    fn get_dbname(&self, target: Pnn, dbid: u32) -> Result<String> {
        self.require(target)?;
        self.cluster
            .with_node(target, |n| n.dbmap.get(dbid).map(|d| d.name.clone()))
            .flatten()
            .ok_or_else(|| RecoveryError::Disagreement { pnn: target, reason: format!("no db {}", dbid) })
    }

    fn get_public_ips(&self, target: Pnn) -> Result<Vec<IpAddr>> {
        self.require(target)?;
        self.cluster.with_node(target, |n| n.public_ips.clone()).ok_or_else(|| Self::missing(target))
    }

    fn get_recmaster(&self, target: Pnn) -> Result<Option<Pnn>> {
        self.require(target)?;
        self.cluster.with_node(target, |n| n.recmaster).ok_or_else(|| Self::missing(target))
    }

    fn get_recmode(&self, target: Pnn) -> Result<RecoveryMode> {
        self.require(target)?;
        self.cluster.with_node(target, |n| n.recmode).ok_or_else(|| Self::missing(target))
    }

    fn get_max_rsn(&self, target: Pnn, dbid: u32) -> Result<u64> {
        self.require(target)?;
        self.cluster
            .with_node(target, |n| n.max_rsn.get(&dbid).copied().unwrap_or(0))
            .ok_or_else(|| Self::missing(target))
    }

    fn get_all_tunables(&self, target: Pnn) -> Result<Tunables> {
        self.require(target)?;
        self.cluster.with_node(target, |n| n.tunables.clone()).ok_or_else(|| Self::missing(target))
    }

    fn set_recmaster(&self, target: Pnn, pnn: Pnn) -> Result<()> {
        self.require(target)?;
        self.cluster.with_node_mut(target, |n| n.recmaster = Some(pnn)).ok_or_else(|| Self::missing(target))
    }

    fn set_recmode(&self, target: Pnn, mode: RecoveryMode) -> Result<()> {
        self.require(target)?;
        self.cluster.with_node_mut(target, |n| n.recmode = mode).ok_or_else(|| Self::missing(target))
    }

    fn set_vnnmap(&self, target: Pnn, vm: &VnnMap) -> Result<()> {
        self.require(target)?;
        let vm = vm.clone();
        self.cluster.with_node_mut(target, |n| n.vnnmap = vm).ok_or_else(|| Self::missing(target))
    }

    fn set_dmaster(&self, target: Pnn, _dbid: u32, _master: Pnn) -> Result<()> {
        self.require(target)?;
        Ok(())
    }

    fn mod_flags(&self, target: Pnn, set_mask: NodeFlags, clear_mask: NodeFlags) -> Result<()> {
        self.require(target)?;
        self.cluster
            .with_node_mut(target, |n| {
                if let Some(me) = n.nodemap.get_mut(target) {
                    me.flags.insert(set_mask);
                    me.flags.remove(clear_mask);
                }
            })
            .ok_or_else(|| Self::missing(target))
    }

    fn create_db(&self, target: Pnn, name: &str, persistent: bool) -> Result<()> {
        self.require(target)?;
        let name = name.to_string();
        self.cluster
            .with_node_mut(target, |n| {
                if !n.dbmap.contains_name(&name) {
                    let next_id = n.dbmap.dbs.iter().map(|d| d.dbid).max().map_or(0, |m| m + 1);
                    n.dbmap.dbs.push(DbEntry { dbid: next_id, name, persistent });
                }
            })
            .ok_or_else(|| Self::missing(target))
    }

    fn freeze(&self, target: Pnn) -> Result<()> {
        self.require(target)?;
        self.cluster.with_node_mut(target, |n| n.frozen = true).ok_or_else(|| Self::missing(target))
    }

    fn thaw(&self, target: Pnn) -> Result<()> {
        self.require(target)?;
        self.cluster.with_node_mut(target, |n| n.frozen = false).ok_or_else(|| Self::missing(target))
    }

    fn copy_db(&self, executor: Pnn, source: Pnn, dbid: u32) -> Result<()> {
        self.require(executor)?;
        self.require(source)?;
        let source_rsn = self.cluster.with_node(source, |n| n.max_rsn.get(&dbid).copied().unwrap_or(0));
        let source_entry = self.cluster.with_node(source, |n| n.dbmap.get(dbid).cloned()).flatten();
        self.cluster
            .with_node_mut(executor, |n| {
                if let Some(entry) = source_entry {
                    if n.dbmap.get(dbid).is_none() {
                        n.dbmap.dbs.push(entry);
                    }
                }
                if let Some(rsn) = source_rsn {
                    let slot = n.max_rsn.entry(dbid).or_insert(0);
                    *slot = (*slot).max(rsn);
                }
            })
            .ok_or_else(|| Self::missing(executor))
    }

    fn set_rsn_nonempty(&self, target: Pnn, dbid: u32, rsn: u64) -> Result<()> {
        self.require(target)?;
        self.cluster
            .with_node_mut(target, |n| {
                let slot = n.max_rsn.entry(dbid).or_insert(0);
                *slot = (*slot).max(rsn);
            })
            .ok_or_else(|| Self::missing(target))
    }

    fn delete_low_rsn(&self, target: Pnn, _dbid: u32, _rsn: u64) -> Result<()> {
        self.require(target)?;
        Ok(())
    }

    fn send_message(&self, destination: Destination, srvid: Srvid, payload: Vec<u8>) -> Result<()> {
        self.cluster.messages.lock().unwrap().push((destination, srvid, payload));
        Ok(())
    }
}
