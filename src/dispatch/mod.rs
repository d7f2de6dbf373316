//! Event dispatcher (C6), §4.6. Handlers are keyed by `Srvid` and must
//! return quickly - any work heavier than updating cached state is left for
//! the monitor loop to pick up on its next tick.

use log::{info, warn};

use crate::common::{NodeFlags, Pnn};
use crate::coordinator::Coordinator;
use crate::election::{handle_election, ElectionMessage, ElectionOutcome};
use crate::error::Result;

/// Payload of a `NODE_FLAGS_CHANGED` broadcast (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct NodeFlagsChanged {
    pub pnn: Pnn,
    pub old_flags: NodeFlags,
    pub new_flags: NodeFlags,
}

/// Payload of `BAN_NODE` / `UNBAN_NODE` (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct BanRequest {
    pub pnn: Pnn,
    pub ban_time_secs: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct UnbanRequest {
    pub pnn: Pnn,
}

/// `RECOVERY` handler: runs the election state machine (C3) against an
/// incoming peer's election message.
pub fn on_recovery(coordinator: &Coordinator, them: &ElectionMessage) -> Result<()> {
    let priority_time = *coordinator.priority_time.lock().unwrap();
    let self_flags = coordinator
        .cache
        .lock()
        .unwrap()
        .nodemap
        .get(coordinator.self_pnn)
        .map(|n| n.flags)
        .unwrap_or_default();
    let nodemap = coordinator.cache.lock().unwrap().nodemap.clone();

    let outcome = handle_election(
        coordinator.client.as_ref(),
        coordinator.self_pnn,
        priority_time,
        self_flags,
        &nodemap,
        them,
    )?;

    match outcome {
        ElectionOutcome::WonReassert => {
            info!(target: "recoverd::dispatch", "won election against node {}, reasserting", them.pnn);
        }
        ElectionOutcome::Conceded { new_recmaster } => {
            info!(target: "recoverd::dispatch", "conceded election to node {}", new_recmaster);

            // §4.3: "if we previously held the recovery lock, release it and
            // unban_all()" - both are gated on having held the lock, per the
            // original `election_handler`'s `if (... && recovery_lock_fd !=
            // -1)`. `probe` tells us whether we were still holding it.
            let mut lock = coordinator.lock.lock().unwrap();
            if lock.probe() {
                lock.release();
                drop(lock);
                let nodemap = coordinator.cache.lock().unwrap().nodemap.clone();
                coordinator.ban_registry.lock().unwrap().unban_all(coordinator.client.as_ref(), &nodemap)?;
            } else {
                drop(lock);
            }

            // §3: a new election destroys the whole ban table outright,
            // including entries `unban_all` leaves alone (disconnected
            // peers) - not just the subset `unban_all` cleared above.
            coordinator.ban_registry.lock().unwrap().clear();

            coordinator.cache.lock().unwrap().recmaster = Some(new_recmaster);
            *coordinator.culprit.lock().unwrap() = crate::ban::CulpritTracker::new();
        }
    }
    Ok(())
}

/// `NODE_FLAGS_CHANGED` handler (§4.6): a remote's report of a third
/// party's `DISCONNECTED` bit is ignored - only the locally
/// observed bit is authoritative. Refreshes the cached `recmaster`/`recmode`
/// view and, if we are master in `NORMAL` and the change touched `DISABLED`,
/// marks `need_takeover_run`.
pub fn on_node_flags_changed(coordinator: &Coordinator, event: NodeFlagsChanged) {
    let mut cache = coordinator.cache.lock().unwrap();
    let locally_observed = cache.nodemap.get(event.pnn).map(|n| n.flags).unwrap_or_default();

    if let Some(node) = cache.nodemap.get_mut(event.pnn) {
        node.flags = event.new_flags;
        node.flags.set(NodeFlags::DISCONNECTED, locally_observed.contains(NodeFlags::DISCONNECTED));
    }

    let is_master = cache.recmaster == Some(coordinator.self_pnn);
    let disabled_changed = (event.old_flags ^ event.new_flags).contains(NodeFlags::DISABLED);
    if is_master && cache.recmode == crate::common::RecoveryMode::Normal && disabled_changed {
        cache.need_takeover_run = true;
    }
}

/// `BAN_NODE` handler: honored only when we are the current recmaster.
pub fn on_ban_node(coordinator: &Coordinator, request: BanRequest) -> Result<()> {
    let mut cache = coordinator.cache.lock().unwrap();
    if cache.recmaster != Some(coordinator.self_pnn) {
        warn!(target: "recoverd::dispatch", "ignoring BAN_NODE for {}: not recmaster", request.pnn);
        return Ok(());
    }
    let enable_bans = coordinator.tunables.lock().unwrap().enable_bans;
    let mut priority_time = coordinator.priority_time.lock().unwrap();
    coordinator.ban_registry.lock().unwrap().ban(
        coordinator.client.as_ref(),
        request.pnn,
        request.ban_time_secs,
        enable_bans,
        &mut priority_time,
    )?;
    cache.nodemap.get_mut(request.pnn).map(|n| n.flags.insert(NodeFlags::BANNED));
    Ok(())
}

/// `UNBAN_NODE` handler: same master-only gate as `BAN_NODE`.
pub fn on_unban_node(coordinator: &Coordinator, request: UnbanRequest) -> Result<()> {
    let mut cache = coordinator.cache.lock().unwrap();
    if cache.recmaster != Some(coordinator.self_pnn) {
        warn!(target: "recoverd::dispatch", "ignoring UNBAN_NODE for {}: not recmaster", request.pnn);
        return Ok(());
    }
    coordinator.ban_registry.lock().unwrap().unban(coordinator.client.as_ref(), request.pnn)?;
    cache.nodemap.get_mut(request.pnn).map(|n| n.flags.remove(NodeFlags::BANNED));
    Ok(())
}
