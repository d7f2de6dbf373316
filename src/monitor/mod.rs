//! Monitor loop (C4), §4.4. Runs forever; each tick re-reads all state from
//! scratch (§5: "no cross-tick invariants are assumed about cached
//! values"). A `force_election`/`run_recovery` call ends the tick
//! immediately, skipping the remaining steps; a propagated `RecoveryError`
//! does too, caught by [`run_forever`] and logged rather than surfaced
//! further (§7).

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::common::{MonitorResult, NodeFlags, Pnn, RecoveryMode};
use crate::coordinator::Coordinator;
use crate::election::send_election;
use crate::error::Result;
use crate::recovery::run_recovery;
use crate::rpc::fan_out;

/// Drives the monitor loop until the process exits. Every error from one
/// tick is logged and the loop continues, except `FatalInternal`, which
/// aborts the process (§7: "abort the process (unrecoverable)").
pub fn run_forever(coordinator: Arc<Coordinator>) -> ! {
    loop {
        let interval = coordinator.tunables.lock().unwrap().recover_interval();
        std::thread::sleep(interval);

        if let Err(e) = run_once(&coordinator) {
            if e.is_fatal() {
                error!(target: "recoverd::monitor", "fatal error, aborting: {}", e);
                std::process::exit(1);
            }
            warn!(target: "recoverd::monitor", "monitor tick failed, restarting: {}", e);
        }
    }
}

/// Runs steps 2-17 of one tick. Returning `Ok(())` early ends the tick
/// early: the next tick starts fresh from the top.
pub fn run_once(coordinator: &Coordinator) -> Result<()> {
    let self_pnn = coordinator.self_pnn;
    let client = coordinator.client.clone();

    // Step 2: refresh tunables, pnn, vnnmap, nodemap.
    let tunables = client.get_all_tunables(self_pnn)?;
    *coordinator.tunables.lock().unwrap() = tunables.clone();
    let nodemap = client.get_nodemap(self_pnn)?;
    let vnnmap = client.get_vnnmap(self_pnn)?;
    {
        let mut cache = coordinator.cache.lock().unwrap();
        cache.nodemap = nodemap;
        cache.vnnmap = vnnmap;
    }

    // Step 3: reconcile BANNED bits against the local ban registry, and
    // process any auto-unban timers that fired since the last tick.
    {
        let mut cache = coordinator.cache.lock().unwrap();
        coordinator.ban_registry.lock().unwrap().reconcile(&mut cache.nodemap);
    }
    for pnn in coordinator.drain_expired_bans() {
        coordinator.ban_registry.lock().unwrap().unban(client.as_ref(), pnn)?;
        if let Some(node) = coordinator.cache.lock().unwrap().nodemap.get_mut(pnn) {
            node.flags.remove(NodeFlags::BANNED);
        }
    }

    // Step 4: num_active, snapshotted for the rest of this tick (consumed
    // by the vnn-map consistency check in step 16 via vnnmap.is_consistent_with).
    let _num_active = coordinator.cache.lock().unwrap().nodemap.num_active();

    // Steps 5-6: recmaster validity.
    let recmaster = match client.get_recmaster(self_pnn)? {
        None => {
            force_election(coordinator)?;
            return Ok(());
        }
        Some(pnn) => pnn,
    };
    let master_disconnected_locally = {
        let cache = coordinator.cache.lock().unwrap();
        match cache.nodemap.get(recmaster) {
            None => true,
            Some(n) => n.flags.contains(NodeFlags::DISCONNECTED),
        }
    };
    if master_disconnected_locally {
        force_election(coordinator)?;
        return Ok(());
    }
    let master_considers_itself_inactive =
        client.get_nodemap(recmaster)?.get(recmaster).map(|n| !n.flags.is_active()).unwrap_or(true);
    if master_considers_itself_inactive {
        force_election(coordinator)?;
        return Ok(());
    }
    coordinator.cache.lock().unwrap().recmaster = Some(recmaster);

    // Step 7: public IP sanity.
    if tunables.public_ip_enabled {
        let nodemap = coordinator.cache.lock().unwrap().nodemap.clone();
        let expected = coordinator.takeover.expected_public_ips(&nodemap, self_pnn);
        let bound = client.get_public_ips(self_pnn)?;
        let mismatched = expected.iter().any(|ip| !bound.contains(ip)) || bound.iter().any(|ip| !expected.contains(ip));
        if mismatched {
            warn!(target: "recoverd::monitor", "public IP mismatch on node {}, freezing and forcing recovery", self_pnn);
            client.freeze(self_pnn)?;
            client.set_recmode(self_pnn, RecoveryMode::Active)?;
            coordinator.cache.lock().unwrap().recmode = RecoveryMode::Active;
            return Ok(());
        }
    }

    // Step 8: followers stop here.
    if self_pnn != recmaster {
        return Ok(());
    }

    // Steps 10-17: master duties.
    master_duties(coordinator, &client)
}

fn master_duties(coordinator: &Coordinator, client: &Arc<dyn crate::rpc::PeerClient>) -> Result<()> {
    let self_pnn = coordinator.self_pnn;
    let timeout = coordinator.tunables.lock().unwrap().recover_timeout();

    // Step 10: update_local_flags - adopt each connected peer's own view of
    // its flags if it differs from ours.
    let connected: Vec<Pnn> = {
        let cache = coordinator.cache.lock().unwrap();
        cache.nodemap.nodes.iter().filter(|n| !n.flags.contains(NodeFlags::DISCONNECTED)).map(|n| n.pnn).collect()
    };
    for &peer in &connected {
        let peer_nodemap = client.get_nodemap(peer)?;
        if let Some(peer_self) = peer_nodemap.get(peer) {
            let mut cache = coordinator.cache.lock().unwrap();
            let locally_observed =
                cache.nodemap.get(peer).map(|n| n.flags).unwrap_or_default();
            if let Some(node) = cache.nodemap.get_mut(peer) {
                if node.flags != peer_self.flags {
                    node.flags = peer_self.flags;
                    node.flags.set(NodeFlags::DISCONNECTED, locally_observed.contains(NodeFlags::DISCONNECTED));
                }
            }
        }
    }

    // Step 11: refresh per-node public-ip inventories (kept only as a
    // side-effecting read here; ownership lives with the takeover
    // collaborator).
    for &peer in &connected {
        let _ = client.get_public_ips(peer)?;
    }

    // Step 12: verify_recmaster.
    let active: Vec<Pnn> = coordinator.cache.lock().unwrap().nodemap.active_pnns();
    let verify_recmaster_result = {
        let client = client.clone();
        fan_out(&active, timeout, move |pnn| match client.get_recmaster(pnn) {
            Ok(Some(p)) if p == self_pnn => MonitorResult::Ok,
            Ok(_) => MonitorResult::ElectionNeeded,
            Err(_) => MonitorResult::Failed,
        })
    };
    match verify_recmaster_result {
        MonitorResult::ElectionNeeded | MonitorResult::RecoveryNeeded => {
            force_election(coordinator)?;
            return Ok(());
        }
        MonitorResult::Failed => return Ok(()),
        MonitorResult::Ok => {}
    }

    // Step 13: if the previous recovery never completed, finish it now.
    if coordinator.cache.lock().unwrap().need_recovery {
        run_recovery(coordinator, self_pnn)?;
        return Ok(());
    }

    // Step 14: verify_recmode.
    let verify_recmode_result = {
        let client = client.clone();
        fan_out(&active, timeout, move |pnn| match client.get_recmode(pnn) {
            Ok(RecoveryMode::Normal) => MonitorResult::Ok,
            Ok(RecoveryMode::Active) => MonitorResult::RecoveryNeeded,
            Err(_) => MonitorResult::Failed,
        })
    };
    match verify_recmode_result {
        MonitorResult::RecoveryNeeded => {
            run_recovery(coordinator, self_pnn)?;
            return Ok(());
        }
        MonitorResult::Failed => return Ok(()),
        _ => {}
    }

    // Step 15: the recovery lock must still be held.
    if !coordinator.lock.lock().unwrap().probe() {
        warn!(target: "recoverd::monitor", "recovery lock lost, forcing recovery");
        coordinator.lock.lock().unwrap().release();
        run_recovery(coordinator, self_pnn)?;
        return Ok(());
    }

    // Step 16: pairwise node-map and vnn-map consistency checks against every peer.
    let local_nodemap = coordinator.cache.lock().unwrap().nodemap.clone();
    let local_vnnmap = coordinator.cache.lock().unwrap().vnnmap.clone();
    let local_active_pnns = local_nodemap.active_pnns();
    if !local_vnnmap.is_consistent_with(&local_active_pnns) {
        run_recovery(coordinator, self_pnn)?;
        return Ok(());
    }
    for &peer in &active {
        if peer == self_pnn {
            continue;
        }
        let peer_nodemap = client.get_nodemap(peer)?;
        let peer_vnnmap = client.get_vnnmap(peer)?;
        let consistent = local_nodemap.agrees_on_inactive_bits(&peer_nodemap)
            && peer_vnnmap.generation == local_vnnmap.generation
            && peer_vnnmap.map == local_vnnmap.map;
        if !consistent {
            info!(target: "recoverd::monitor", "node {} disagrees with local state, running recovery", peer);
            run_recovery(coordinator, peer)?;
            return Ok(());
        }
    }

    // Step 17: pending IP takeover.
    if coordinator.cache.lock().unwrap().need_takeover_run {
        let nodemap = coordinator.cache.lock().unwrap().nodemap.clone();
        if coordinator.takeover.takeover_run(&nodemap).is_err() {
            run_recovery(coordinator, self_pnn)?;
            return Ok(());
        }
        coordinator.cache.lock().unwrap().need_takeover_run = false;
    }

    Ok(())
}

/// Sets recovery mode ACTIVE cluster-wide, broadcasts our own election
/// message, then waits out `election_timeout` for the dust to settle
/// (§4.3 "forced election").
fn force_election(coordinator: &Coordinator) -> Result<()> {
    let self_pnn = coordinator.self_pnn;
    let client = coordinator.client.clone();
    let active: Vec<Pnn> = coordinator.cache.lock().unwrap().nodemap.active_pnns();
    let timeout = coordinator.tunables.lock().unwrap().recover_timeout();

    {
        let client = client.clone();
        let _ = crate::rpc::fanout::fan_out_all_ok(&active, timeout, move |pnn| {
            client.set_recmode(pnn, RecoveryMode::Active)
        });
    }

    let priority_time = *coordinator.priority_time.lock().unwrap();
    let self_flags = coordinator.cache.lock().unwrap().nodemap.get(self_pnn).map(|n| n.flags).unwrap_or_default();
    let nodemap = coordinator.cache.lock().unwrap().nodemap.clone();
    send_election(client.as_ref(), self_pnn, priority_time, self_flags, &nodemap)?;

    let election_timeout = coordinator.tunables.lock().unwrap().election_timeout();
    std::thread::sleep(Duration::from_secs(election_timeout.as_secs()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Node, NodeFlags, NodeMap};
    use crate::config::Tunables;
    use crate::lock::RecoveryLock;
    use crate::rpc::mock::{MockCluster, MockNodeState};
    use crate::takeover::NullIpTakeover;
    use std::net::{Ipv4Addr, SocketAddr};

    struct NoopLock(bool);
    impl RecoveryLock for NoopLock {
        fn acquire(&mut self, _blocking: bool) -> Result<()> { Ok(()) }
        fn probe(&mut self) -> bool { self.0 }
        fn release(&mut self) {}
    }

    fn node(pnn: u32) -> Node {
        Node { pnn: Pnn(pnn), flags: NodeFlags::empty(), address: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 4000) }
    }

    fn three_node_cluster() -> (MockCluster, NodeMap) {
        let cluster = MockCluster::new();
        let nodemap = NodeMap::new(vec![node(0), node(1), node(2)]);
        for pnn in 0..3u32 {
            cluster.insert(
                Pnn(pnn),
                MockNodeState::new(nodemap.clone(), Default::default(), Default::default(), Tunables::default()),
            );
        }
        for pnn in 0..3u32 {
            cluster.with_node_mut(Pnn(pnn), |n| n.recmaster = Some(Pnn(0)));
        }
        (cluster, nodemap)
    }

    fn coordinator(cluster: &MockCluster, nodemap: NodeMap, pnn: Pnn, lock_held: bool) -> Arc<Coordinator> {
        let client = Arc::new(cluster.client());
        let coordinator = Coordinator::new(
            pnn,
            Tunables {
                recover_interval: 0,
                recover_timeout: 2,
                election_timeout: 0,
                rerecovery_timeout: 0,
                ..Tunables::default()
            },
            client,
            Box::new(NoopLock(lock_held)),
            Arc::new(NullIpTakeover),
        );
        coordinator.cache.lock().unwrap().nodemap = nodemap;
        coordinator.cache.lock().unwrap().recmaster = Some(Pnn(0));
        coordinator
    }

    #[test]
    fn steady_state_master_tick_triggers_no_recovery_or_election() {
        let (cluster, nodemap) = three_node_cluster();
        for pnn in 0..3u32 {
            let vm = crate::common::VnnMap::new(7, vec![Pnn(0), Pnn(1), Pnn(2)]);
            cluster.with_node_mut(Pnn(pnn), |n| n.vnnmap = vm.clone());
        }
        let coordinator = coordinator(&cluster, nodemap, Pnn(0), true);
        coordinator.cache.lock().unwrap().vnnmap = crate::common::VnnMap::new(7, vec![Pnn(0), Pnn(1), Pnn(2)]);

        for _ in 0..10 {
            run_once(&coordinator).unwrap();
        }
        assert!(!coordinator.cache.lock().unwrap().need_recovery);
    }

    #[test]
    fn follower_tick_stops_after_step_eight() {
        let (cluster, nodemap) = three_node_cluster();
        let coordinator = coordinator(&cluster, nodemap, Pnn(1), true);
        run_once(&coordinator).unwrap();
        // a follower never touches the recovery lock
    }

    #[test]
    fn missing_recmaster_forces_an_election() {
        let (cluster, nodemap) = three_node_cluster();
        for pnn in 0..3u32 {
            cluster.with_node_mut(Pnn(pnn), |n| n.recmaster = None);
        }
        let coordinator = coordinator(&cluster, nodemap, Pnn(2), true);
        run_once(&coordinator).unwrap();
        let messages = cluster.drained_messages();
        assert!(!messages.is_empty(), "a RECOVERY broadcast should have been sent");
    }

    #[test]
    fn lost_recovery_lock_triggers_recovery() {
        let (cluster, nodemap) = three_node_cluster();
        for pnn in 0..3u32 {
            let vm = crate::common::VnnMap::new(7, vec![Pnn(0), Pnn(1), Pnn(2)]);
            cluster.with_node_mut(Pnn(pnn), |n| n.vnnmap = vm.clone());
        }
        let coordinator = coordinator(&cluster, nodemap, Pnn(0), false);
        coordinator.cache.lock().unwrap().vnnmap = crate::common::VnnMap::new(7, vec![Pnn(0), Pnn(1), Pnn(2)]);

        run_once(&coordinator).unwrap();
        assert_eq!(cluster.with_node(Pnn(0), |n| n.recmaster).unwrap(), Some(Pnn(0)));
    }
}
