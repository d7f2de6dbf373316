//! Scenario 3 from the testable-properties list: one peer's vnn map
//! generation has drifted from the master's; recovery converges every
//! peer onto a single fresh generation.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use recoverd::common::{Node, NodeFlags, NodeMap, Pnn, VnnMap, INVALID_GENERATION};
use recoverd::config::Tunables;
use recoverd::coordinator::Coordinator;
use recoverd::error::Result;
use recoverd::lock::RecoveryLock;
use recoverd::recovery::run_recovery;
use recoverd::rpc::mock::{MockCluster, MockNodeState};
use recoverd::takeover::NullIpTakeover;

struct NoopLock;
impl RecoveryLock for NoopLock {
    fn acquire(&mut self, _blocking: bool) -> Result<()> { Ok(()) }
    fn probe(&mut self) -> bool { true }
    fn release(&mut self) {}
}

fn node(pnn: u32) -> Node {
    Node { pnn: Pnn(pnn), flags: NodeFlags::empty(), address: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 4000 + pnn as u16) }
}

#[test]
fn generation_divergence_is_resolved_by_recovery_with_culprit_two() {
    let cluster = MockCluster::new();
    let nodemap = NodeMap::new(vec![node(0), node(1), node(2)]);
    let agreed = VnnMap::new(42, vec![Pnn(0), Pnn(1), Pnn(2)]);
    for pnn in 0..3u32 {
        cluster.insert(Pnn(pnn), MockNodeState::new(nodemap.clone(), agreed.clone(), Default::default(), Tunables::default()));
    }
    // node 2 has drifted onto a different generation
    cluster.with_node_mut(Pnn(2), |n| n.vnnmap.generation = 99);

    let client = Arc::new(cluster.client());
    let coordinator = Coordinator::new(
        Pnn(0),
        Tunables { rerecovery_timeout: 0, recover_timeout: 2, ..Tunables::default() },
        client,
        Box::new(NoopLock),
        Arc::new(NullIpTakeover),
    );
    coordinator.cache.lock().unwrap().nodemap = nodemap;
    coordinator.cache.lock().unwrap().vnnmap = agreed;

    run_recovery(&coordinator, Pnn(2)).expect("recovery should converge despite the drift");

    let generations: Vec<u32> = (0..3).map(|pnn| cluster.with_node(Pnn(pnn), |n| n.vnnmap.generation).unwrap()).collect();
    assert_ne!(generations[0], INVALID_GENERATION);
    assert!(generations.windows(2).all(|w| w[0] == w[1]), "every peer should share the same post-recovery generation");
    assert_ne!(generations[0], 42, "recovery must produce a fresh generation, not keep reusing the pre-drift one");
}
