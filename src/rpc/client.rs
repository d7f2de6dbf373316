//! The peer RPC surface (§4.1, §6). The transport itself is an external
//! collaborator (§1); `PeerClient` is the typed boundary the rest of the
//! coordinator programs against, rather than a concrete socket type.

use std::net::IpAddr;

use crate::common::{DbMap, NodeFlags, NodeMap, Pnn, RecoveryMode, VnnMap};
use crate::config::Tunables;
use crate::error::Result;

/// Broadcast destination set (§4.1, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    All,
    Connected,
    Single(Pnn),
}

/// Well-known broadcast message service ids (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Srvid {
    Recovery,
    NodeFlagsChanged,
    BanNode,
    UnbanNode,
    Reconfigure,
}

/// Every control is request/reply with an integer status; a transport
/// failure and a non-zero status both surface as `RecoveryError`.
pub trait PeerClient: Send + Sync {
    fn get_pnn(&self, target: Pnn) -> Result<Pnn>;
    fn get_nodemap(&self, target: Pnn) -> Result<NodeMap>;
    fn get_vnnmap(&self, target: Pnn) -> Result<VnnMap>;
    fn get_dbmap(&self, target: Pnn) -> Result<DbMap>;
    fn get_dbname(&self, target: Pnn, dbid: u32) -> Result<String>;
    fn get_public_ips(&self, target: Pnn) -> Result<Vec<IpAddr>>;
    fn get_recmaster(&self, target: Pnn) -> Result<Option<Pnn>>;
    fn get_recmode(&self, target: Pnn) -> Result<RecoveryMode>;
    fn get_max_rsn(&self, target: Pnn, dbid: u32) -> Result<u64>;
    fn get_all_tunables(&self, target: Pnn) -> Result<Tunables>;

    fn set_recmaster(&self, target: Pnn, pnn: Pnn) -> Result<()>;
    fn set_recmode(&self, target: Pnn, mode: RecoveryMode) -> Result<()>;
    fn set_vnnmap(&self, target: Pnn, vm: &VnnMap) -> Result<()>;
    fn set_dmaster(&self, target: Pnn, dbid: u32, master: Pnn) -> Result<()>;
    fn mod_flags(&self, target: Pnn, set_mask: NodeFlags, clear_mask: NodeFlags) -> Result<()>;
    fn create_db(&self, target: Pnn, name: &str, persistent: bool) -> Result<()>;
    fn freeze(&self, target: Pnn) -> Result<()>;
    fn thaw(&self, target: Pnn) -> Result<()>;
    /// Instruct `executor` to merge-copy database `dbid` in from `source`
    /// (merges by rsn, performed by the local storage engine).
    fn copy_db(&self, executor: Pnn, source: Pnn, dbid: u32) -> Result<()>;
    fn set_rsn_nonempty(&self, target: Pnn, dbid: u32, rsn: u64) -> Result<()>;
    fn delete_low_rsn(&self, target: Pnn, dbid: u32, rsn: u64) -> Result<()>;

    fn send_message(&self, destination: Destination, srvid: Srvid, payload: Vec<u8>) -> Result<()>;
}
