//! Recovery procedure (C5), §4.5. Precondition: the caller already holds
//! the recovery-master role. Every stage runs strictly after the previous
//! one has finished (§5: "stage N+1 begins only after every peer callback
//! of stage N has returned") - there is no overlap between stages.

use log::{info, warn};

use crate::common::{new_generation, DbEntry, Pnn, VnnMap};
use crate::coordinator::Coordinator;
use crate::error::{RecoveryError, Result};
use crate::rpc::client::{Destination, Srvid};
use crate::rpc::fanout::fan_out_all_ok;

/// Runs the full 15-stage recovery procedure with `culprit` blamed for the
/// triggering condition. Sets `need_recovery` before stage 1 so that an
/// abort at any point is retried on the next monitor tick; clears it only
/// after the final stage succeeds.
pub fn run_recovery(coordinator: &Coordinator, culprit: Pnn) -> Result<()> {
    coordinator.cache.lock().unwrap().need_recovery = true;
    warn!(target: "recoverd::recovery", "running recovery, culprit = node {}", culprit);

    let num_nodes = coordinator.cache.lock().unwrap().nodemap.len();
    let grace_period = coordinator.tunables.lock().unwrap().recovery_grace_period;
    let tripped = coordinator.culprit.lock().unwrap().record(culprit, num_nodes, grace_period);
    if tripped {
        let ban_period = coordinator.tunables.lock().unwrap().recovery_ban_period;
        let enable_bans = coordinator.tunables.lock().unwrap().enable_bans;
        let mut priority_time = coordinator.priority_time.lock().unwrap();
        warn!(target: "recoverd::recovery", "culprit {} tripped the auto-ban threshold", culprit);
        coordinator.ban_registry.lock().unwrap().ban(
            coordinator.client.as_ref(),
            culprit,
            ban_period,
            enable_bans,
            &mut priority_time,
        )?;
    }

    let result = run_stages(coordinator);
    if result.is_ok() {
        coordinator.cache.lock().unwrap().need_recovery = false;
        std::thread::sleep(coordinator.tunables.lock().unwrap().rerecovery_timeout());
    }
    result
}

fn run_stages(coordinator: &Coordinator) -> Result<()> {
    let self_pnn = coordinator.self_pnn;
    let timeout = coordinator.tunables.lock().unwrap().recover_timeout();

    // Stage 1: acquire the recovery lock.
    coordinator
        .lock
        .lock()
        .unwrap()
        .acquire(true)
        .map_err(|e| RecoveryError::LockLost(format!("recovery lock acquire failed: {}", e)))?;

    let active: Vec<Pnn> = coordinator.cache.lock().unwrap().nodemap.active_pnns();

    // Stage 2: freeze, then flip every active peer to ACTIVE recovery mode.
    let client = coordinator.client.clone();
    {
        let client = client.clone();
        fan_out_all_ok(&active, timeout, move |pnn| client.freeze(pnn))?;
    }
    {
        let client = client.clone();
        fan_out_all_ok(&active, timeout, move |pnn| client.set_recmode(pnn, crate::common::RecoveryMode::Active))?;
    }

    // Stage 3: bump the local generation only - deliberately leaves the
    // cluster inconsistent so a mid-recovery abort is visible next tick.
    let bumped_generation = {
        let mut cache = coordinator.cache.lock().unwrap();
        cache.vnnmap.generation = new_generation();
        let vnnmap = cache.vnnmap.clone();
        drop(cache);
        client.set_vnnmap(self_pnn, &vnnmap)?;
        vnnmap.generation
    };
    info!(target: "recoverd::recovery", "bumped local generation to {}", bumped_generation);

    // Stage 4: database map reconciliation, including the deliberate
    // double-invocation of create_missing_remote_databases (step 4a run
    // twice) - do not deduplicate this, it is load-bearing (§9).
    create_missing_remote_databases(coordinator, &active)?;
    create_missing_local_databases(coordinator, &active)?;
    create_missing_remote_databases(coordinator, &active)?;

    let dbids: Vec<u32> = coordinator.cache.lock().unwrap().dbmap.dbids().into_iter().collect();

    // Stage 5: pull every db from every other active peer.
    for &dbid in &dbids {
        let peers: Vec<Pnn> = active.iter().copied().filter(|&p| p != self_pnn).collect();
        let client = client.clone();
        fan_out_all_ok(&peers, timeout, move |peer| client.copy_db(self_pnn, peer, dbid))?;
    }

    // Stage 6: push self's copy out to every other active peer.
    for &dbid in &dbids {
        let peers: Vec<Pnn> = active.iter().copied().filter(|&p| p != self_pnn).collect();
        let client = client.clone();
        fan_out_all_ok(&peers, timeout, move |peer| client.copy_db(peer, self_pnn, dbid))?;
    }

    // Stage 7: a fresh, consistent vnn map, pushed to every active peer.
    let new_vnnmap = VnnMap::new(new_generation(), active.clone());
    {
        let client = client.clone();
        let vnnmap = new_vnnmap.clone();
        fan_out_all_ok(&active, timeout, move |pnn| client.set_vnnmap(pnn, &vnnmap))?;
    }
    coordinator.cache.lock().unwrap().vnnmap = new_vnnmap;

    // Stage 8: recmaster = self, everywhere.
    {
        let client = client.clone();
        fan_out_all_ok(&active, timeout, move |pnn| client.set_recmaster(pnn, self_pnn))?;
    }
    coordinator.cache.lock().unwrap().recmaster = Some(self_pnn);

    // Stage 9: every record becomes locally mastered by the recovery master.
    for &dbid in &dbids {
        let client = client.clone();
        fan_out_all_ok(&active, timeout, move |pnn| client.set_dmaster(pnn, dbid, self_pnn))?;
    }

    // Stage 10: propagate flags for every node-map entry.
    propagate_flags(coordinator)?;

    // Stage 11: vacuum, watermarked off the local max_rsn only (§9 open
    // question: if a peer holds a higher rsn than the local node's, this
    // can delete live records there. The behavior is preserved verbatim
    // rather than silently "fixed").
    for &dbid in &dbids {
        let max_rsn = client.get_max_rsn(self_pnn, dbid)?;
        let watermark = max_rsn + 1;
        let client = client.clone();
        fan_out_all_ok(&active, timeout, move |pnn| {
            client.set_rsn_nonempty(pnn, dbid, watermark)?;
            client.delete_low_rsn(pnn, dbid, watermark)
        })?;
    }

    // Stage 12: IP takeover, if enabled.
    if coordinator.tunables.lock().unwrap().public_ip_enabled {
        let nodemap = coordinator.cache.lock().unwrap().nodemap.clone();
        coordinator.takeover.takeover_run(&nodemap)?;
    }
    coordinator.cache.lock().unwrap().need_takeover_run = false;

    // Stage 13: thaw.
    {
        let client = client.clone();
        fan_out_all_ok(&active, timeout, move |pnn| client.set_recmode(pnn, crate::common::RecoveryMode::Normal))?;
    }
    {
        let client = client.clone();
        fan_out_all_ok(&active, timeout, move |pnn| client.thaw(pnn))?;
    }
    coordinator.cache.lock().unwrap().recmode = crate::common::RecoveryMode::Normal;

    // Stage 14: tell everyone still connected to reconfigure.
    client.send_message(Destination::Connected, Srvid::Reconfigure, Vec::new())?;

    info!(target: "recoverd::recovery", "recovery completed");
    Ok(())
}

fn create_missing_remote_databases(coordinator: &Coordinator, active: &[Pnn]) -> Result<()> {
    let client = coordinator.client.clone();
    let self_pnn = coordinator.self_pnn;
    let local_dbmap = client.get_dbmap(self_pnn)?;
    for entry in &local_dbmap.dbs {
        for &peer in active {
            if peer == self_pnn {
                continue;
            }
            let peer_dbmap = client.get_dbmap(peer)?;
            if !peer_dbmap.contains_name(&entry.name) {
                client.create_db(peer, &entry.name, entry.persistent)?;
            }
        }
    }
    coordinator.cache.lock().unwrap().dbmap = local_dbmap;
    Ok(())
}

fn create_missing_local_databases(coordinator: &Coordinator, active: &[Pnn]) -> Result<()> {
    let client = coordinator.client.clone();
    let self_pnn = coordinator.self_pnn;
    let mut missing: Vec<DbEntry> = Vec::new();
    {
        let local_dbmap = client.get_dbmap(self_pnn)?;
        for &peer in active {
            if peer == self_pnn {
                continue;
            }
            let peer_dbmap = client.get_dbmap(peer)?;
            for entry in &peer_dbmap.dbs {
                if !local_dbmap.contains_name(&entry.name) && !missing.iter().any(|m| m.name == entry.name) {
                    missing.push(entry.clone());
                }
            }
        }
    }
    for entry in &missing {
        client.create_db(self_pnn, &entry.name, entry.persistent)?;
    }
    let refreshed = client.get_dbmap(self_pnn)?;
    coordinator.cache.lock().unwrap().dbmap = refreshed;
    Ok(())
}

fn propagate_flags(coordinator: &Coordinator) -> Result<()> {
    let nodes = coordinator.cache.lock().unwrap().nodemap.nodes.clone();
    for node in &nodes {
        let mut payload = Vec::new();
        use crate::common::wire::Serial;
        node.pnn.serial(&mut payload).expect("writing to a Vec is infallible");
        node.flags.bits().serial(&mut payload).expect("writing to a Vec is infallible");
        node.flags.bits().serial(&mut payload).expect("writing to a Vec is infallible");
        coordinator.client.send_message(Destination::Connected, Srvid::NodeFlagsChanged, payload)?;
    }
    Ok(())
}
