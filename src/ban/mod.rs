//! Ban registry (C2), §4.2.
//!
//! Owned by the coordinator instance for its lifetime. Bans are in-memory,
//! timer-scoped state per §3 ("Ban entry: {target_pnn, timer}. Lifecycle:
//! created on ban ..., destroyed on timer expiry or explicit unban or new
//! election") - purely transient, with no on-disk persistence. See
//! DESIGN.md for the grounding of this module's bookkeeping shape.

use std::collections::HashMap;

use crossbeam_channel::Sender;
use log::info;

use crate::common::{NodeFlags, NodeMap, Pnn};
use crate::error::Result;
use crate::rpc::client::PeerClient;

/// A scheduled unban, fired by a background timer thread. Carries only
/// `pnn`, not a pointer back into the registry (§9: "express as an index
/// into the coordinator's ban table, not as a mutable pointer graph").
#[derive(Debug, Clone, Copy)]
pub struct BanExpired(pub Pnn);

struct BanEntry {
    /// Present when the ban has a finite duration; `None` means "banned
    /// until explicitly unbanned".
    _timer_seconds: Option<u64>,
}

/// Tracks banned peers with per-peer timers; publishes ban flags via
/// `mod_flags` on the peer client.
pub struct BanRegistry {
    self_pnn: Pnn,
    banned: HashMap<Pnn, BanEntry>,
    expiry_tx: Sender<BanExpired>,
}

impl BanRegistry {
    pub fn new(self_pnn: Pnn, expiry_tx: Sender<BanExpired>) -> Self {
        BanRegistry { self_pnn, banned: HashMap::new(), expiry_tx }
    }

    pub fn is_banned(&self, pnn: Pnn) -> bool { self.banned.contains_key(&pnn) }

    pub fn banned_pnns(&self) -> Vec<Pnn> { self.banned.keys().copied().collect() }

    /// A no-op when bans are globally disabled. Sets `pnn`'s own `BANNED`
    /// bit cluster-wide - a single `mod_flags(pnn, ...)`, not a fan-out
    /// over every active node (§4.2: "Sets the peer's `BANNED` flag
    /// cluster-wide").
    pub fn ban(
        &mut self,
        client: &dyn PeerClient,
        pnn: Pnn,
        seconds: u64,
        enable_bans: bool,
        priority_time: &mut crate::common::Timestamp,
    ) -> Result<()> {
        if !enable_bans {
            info!(target: "recoverd::ban", "bans are disabled - ignoring ban of node {}", pnn);
            return Ok(());
        }

        client.mod_flags(pnn, NodeFlags::BANNED, NodeFlags::empty())?;

        info!(target: "recoverd::ban", "banning node {} for {}s", pnn, seconds);
        self.banned.insert(pnn, BanEntry { _timer_seconds: if seconds > 0 { Some(seconds) } else { None } });

        if pnn == self.self_pnn {
            *priority_time = crate::common::now();
        }

        if seconds > 0 {
            schedule_unban_timer(self.expiry_tx.clone(), pnn, seconds);
        }

        Ok(())
    }

    /// No-op if not banned. Clears `pnn`'s own `BANNED` bit cluster-wide.
    pub fn unban(&mut self, client: &dyn PeerClient, pnn: Pnn) -> Result<()> {
        if self.banned.remove(&pnn).is_none() {
            return Ok(());
        }
        info!(target: "recoverd::ban", "unbanning node {}", pnn);
        client.mod_flags(pnn, NodeFlags::empty(), NodeFlags::BANNED)?;
        Ok(())
    }

    /// Clears every currently-banned, non-disconnected peer (§4.3: called
    /// when we lose an election, to avoid carrying stale bans issued under
    /// a prior mastership).
    pub fn unban_all(&mut self, client: &dyn PeerClient, nodemap: &NodeMap) -> Result<()> {
        let banned: Vec<Pnn> = self.banned_pnns();
        for pnn in banned {
            let disconnected =
                nodemap.get(pnn).map(|n| n.flags.contains(NodeFlags::DISCONNECTED)).unwrap_or(true);
            if !disconnected {
                self.unban(client, pnn)?;
            }
        }
        Ok(())
    }

    /// Drops every ban entry outright, without issuing any `mod_flags`
    /// call - a new election destroys the whole table (§3: "destroyed on
    /// timer expiry or explicit unban or new election"), including entries
    /// `unban_all` would otherwise have left alone (disconnected peers).
    pub fn clear(&mut self) { self.banned.clear(); }

    /// Reconstructs the `BANNED` bit of `nodemap` from the local registry -
    /// the master is the source of truth for bans it issued (§4.2).
    pub fn reconcile(&self, nodemap: &mut NodeMap) {
        for node in nodemap.nodes.iter_mut() {
            node.flags.set(NodeFlags::BANNED, self.is_banned(node.pnn));
        }
    }
}

fn schedule_unban_timer(tx: Sender<BanExpired>, pnn: Pnn, seconds: u64) {
    std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_secs(seconds));
        let _ = tx.send(BanExpired(pnn));
    });
}

/// Culprit tracking (§3 "Culprit tracking", §4.5). Owned by
/// the coordinator, reset whenever the culprit changes or the grace window
/// elapses.
pub struct CulpritTracker {
    last_culprit: Option<Pnn>,
    first_time: crate::common::Timestamp,
    counter: u32,
}

impl CulpritTracker {
    pub fn new() -> Self { CulpritTracker { last_culprit: None, first_time: crate::common::now(), counter: 0 } }

    /// Records a recovery blamed on `culprit`. Returns `true` if this
    /// observation pushed the counter past the auto-ban threshold
    /// (`2 * num_nodes`) within `grace_period_secs` of the first
    /// observation of this culprit.
    pub fn record(&mut self, culprit: Pnn, num_nodes: usize, grace_period_secs: u64) -> bool {
        let now = crate::common::now();
        let stale = now.elapsed_secs_since(self.first_time) > grace_period_secs;
        if self.last_culprit != Some(culprit) || stale {
            self.last_culprit = Some(culprit);
            self.first_time = now;
            self.counter = 0;
        }
        self.counter += 1;
        self.counter as usize > 2 * num_nodes
    }
}

impl Default for CulpritTracker {
    fn default() -> Self { Self::new() }
}
