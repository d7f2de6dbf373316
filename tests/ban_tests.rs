//! Scenarios 4 and 5 from the testable-properties list: admin ban/unban
//! gated on recmaster, and the culprit-counter auto-ban threshold.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use recoverd::common::{Node, NodeFlags, NodeMap, Pnn};
use recoverd::config::Tunables;
use recoverd::coordinator::Coordinator;
use recoverd::dispatch::{on_ban_node, on_unban_node, BanRequest, UnbanRequest};
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

fn three_node_cluster() -> (MockCluster, NodeMap) {
    let cluster = MockCluster::new();
    let nodemap = NodeMap::new(vec![node(0), node(1), node(2)]);
    for pnn in 0..3u32 {
        cluster.insert(Pnn(pnn), MockNodeState::new(nodemap.clone(), Default::default(), Default::default(), Tunables::default()));
    }
    (cluster, nodemap)
}

fn coordinator_as(cluster: &MockCluster, nodemap: NodeMap, self_pnn: Pnn, recmaster: Pnn) -> Arc<Coordinator> {
    let client = Arc::new(cluster.client());
    let coordinator = Coordinator::new(
        self_pnn,
        Tunables { recovery_grace_period: 120, recovery_ban_period: 300, rerecovery_timeout: 0, recover_timeout: 2, ..Tunables::default() },
        client,
        Box::new(NoopLock),
        Arc::new(NullIpTakeover),
    );
    let mut cache = coordinator.cache.lock().unwrap();
    cache.nodemap = nodemap;
    cache.recmaster = Some(recmaster);
    drop(cache);
    coordinator
}

#[test]
fn admin_ban_ignored_by_non_master_but_honored_by_master() {
    let (cluster, nodemap) = three_node_cluster();

    let follower = coordinator_as(&cluster, nodemap.clone(), Pnn(0), Pnn(2));
    on_ban_node(&follower, BanRequest { pnn: Pnn(1), ban_time_secs: 5 }).unwrap();
    assert!(!follower.ban_registry.lock().unwrap().is_banned(Pnn(1)), "a non-master must ignore BAN_NODE");

    let master = coordinator_as(&cluster, nodemap, Pnn(2), Pnn(2));
    on_ban_node(&master, BanRequest { pnn: Pnn(1), ban_time_secs: 5 }).unwrap();
    assert!(master.ban_registry.lock().unwrap().is_banned(Pnn(1)), "the recmaster must honor BAN_NODE");
    assert!(master.cache.lock().unwrap().nodemap.get(Pnn(1)).unwrap().flags.contains(NodeFlags::BANNED));

    on_unban_node(&master, UnbanRequest { pnn: Pnn(1) }).unwrap();
    assert!(!master.ban_registry.lock().unwrap().is_banned(Pnn(1)));
}

#[test]
fn repeated_recoveries_blamed_on_the_same_culprit_trigger_an_auto_ban() {
    let (cluster, nodemap) = three_node_cluster();
    let master = coordinator_as(&cluster, nodemap, Pnn(0), Pnn(0));
    let num_nodes = 3;
    let threshold = 2 * num_nodes; // spec: trips when culprit_counter > 2 * num_nodes

    for i in 0..threshold {
        run_recovery(&master, Pnn(2)).unwrap();
        if i < threshold - 1 {
            assert!(!master.ban_registry.lock().unwrap().is_banned(Pnn(2)), "should not ban before the threshold");
        }
    }
    // one more recovery blamed on the same culprit pushes the counter past the threshold
    run_recovery(&master, Pnn(2)).unwrap();
    assert!(master.ban_registry.lock().unwrap().is_banned(Pnn(2)), "culprit should be auto-banned after 2*num_nodes+1 recoveries");
}
