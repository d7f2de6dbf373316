//! Node identifiers and the node map (§3 "Node identifier (PNN)", "Node
//! map").

use std::fmt;
use std::net::SocketAddr;

use super::flags::NodeFlags;

/// Physical Node Number: a stable integer identity assigned at
/// configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pnn(pub u32);

impl fmt::Display for Pnn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<u32> for Pnn {
    fn from(v: u32) -> Self { Pnn(v) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub pnn: Pnn,
    pub flags: NodeFlags,
    pub address: SocketAddr,
}

/// Ordered sequence of nodes. Length and per-index pnn assignment must be
/// identical on every node.
#[derive(Debug, Clone, Default)]
pub struct NodeMap {
    pub nodes: Vec<Node>,
}

impl NodeMap {
    pub fn new(nodes: Vec<Node>) -> Self { NodeMap { nodes } }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn get(&self, pnn: Pnn) -> Option<&Node> { self.nodes.iter().find(|n| n.pnn == pnn) }

    pub fn get_mut(&mut self, pnn: Pnn) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.pnn == pnn)
    }

    pub fn active_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.flags.is_active())
    }

    pub fn active_pnns(&self) -> Vec<Pnn> { self.active_nodes().map(|n| n.pnn).collect() }

    pub fn num_active(&self) -> usize { self.active_nodes().count() }

    /// Peers without `DISCONNECTED` set, counted locally (§4.3
    /// `num_connected`).
    pub fn num_connected(&self) -> usize {
        self.nodes.iter().filter(|n| !n.flags.contains(NodeFlags::DISCONNECTED)).count()
    }

    /// A peer's report of a third party's `DISCONNECTED` bit never
    /// overrides the local value. Call after merging in a peer's flags for
    /// node `pnn`, passing the flags we had locally before the merge.
    pub fn reconcile_disconnected(&mut self, pnn: Pnn, locally_observed: NodeFlags) {
        if let Some(node) = self.get_mut(pnn) {
            node.flags.set(NodeFlags::DISCONNECTED, locally_observed.contains(NodeFlags::DISCONNECTED));
        }
    }

    /// Node-map lengths equal and per-index pnn equal against a peer's
    /// reported map.
    pub fn agrees_on_shape(&self, other: &NodeMap) -> bool {
        self.nodes.len() == other.nodes.len()
            && self.nodes.iter().zip(other.nodes.iter()).all(|(a, b)| a.pnn == b.pnn)
    }

    /// Per-index `INACTIVE` bit equality, used by the consistency check in
    /// the monitor loop (§4.4 step 16).
    pub fn agrees_on_inactive_bits(&self, other: &NodeMap) -> bool {
        self.agrees_on_shape(other)
            && self.nodes.iter().zip(other.nodes.iter()).all(|(a, b)| {
                a.flags.contains(NodeFlags::INACTIVE) == b.flags.contains(NodeFlags::INACTIVE)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn node(pnn: u32, flags: NodeFlags) -> Node {
        Node { pnn: Pnn(pnn), flags, address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000 + pnn as u16) }
    }

    #[test]
    fn active_and_connected_counts() {
        let map = NodeMap::new(vec![
            node(0, NodeFlags::empty()),
            node(1, NodeFlags::DISCONNECTED),
            node(2, NodeFlags::BANNED),
        ]);
        assert_eq!(map.num_active(), 1);
        assert_eq!(map.num_connected(), 2);
    }

    #[test]
    fn disconnected_bit_is_locally_authoritative() {
        let mut map = NodeMap::new(vec![node(0, NodeFlags::empty())]);
        // a peer reports node 0 as disconnected, but we locally observed it
        // as connected - the merge must not adopt DISCONNECTED.
        map.get_mut(Pnn(0)).unwrap().flags.insert(NodeFlags::DISCONNECTED);
        map.reconcile_disconnected(Pnn(0), NodeFlags::empty());
        assert!(!map.get(Pnn(0)).unwrap().flags.contains(NodeFlags::DISCONNECTED));
    }

    #[test]
    fn shape_agreement_requires_same_length_and_order() {
        let a = NodeMap::new(vec![node(0, NodeFlags::empty()), node(1, NodeFlags::empty())]);
        let b = NodeMap::new(vec![node(0, NodeFlags::empty()), node(1, NodeFlags::empty())]);
        assert!(a.agrees_on_shape(&b));
        let c = NodeMap::new(vec![node(1, NodeFlags::empty()), node(0, NodeFlags::empty())]);
        assert!(!a.agrees_on_shape(&c));
    }
}
