//! Ties C1-C6 together into one long-lived instance. One `Coordinator` is
//! constructed at startup by the `recoverd` binary and threaded through the
//! monitor loop and the event dispatcher as shared context - one
//! `Arc<Coordinator>` of collaborators rather than a bag of free functions.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver};

use crate::ban::{BanExpired, BanRegistry, CulpritTracker};
use crate::common::{now, DbMap, NodeMap, Pnn, RecoveryMode, Timestamp, VnnMap};
use crate::config::Tunables;
use crate::lock::RecoveryLock;
use crate::parent::ParentMonitor;
use crate::rpc::PeerClient;
use crate::takeover::IpTakeover;

/// Mutable state the monitor loop and the event dispatcher both touch.
/// Grouped so a single `Mutex` protects one consistent snapshot at a time.
pub struct CoordinatorCache {
    pub recmaster: Option<Pnn>,
    pub recmode: RecoveryMode,
    pub nodemap: NodeMap,
    pub vnnmap: VnnMap,
    pub dbmap: DbMap,
    pub need_recovery: bool,
    pub need_takeover_run: bool,
}

impl CoordinatorCache {
    fn new() -> Self {
        CoordinatorCache {
            recmaster: None,
            recmode: RecoveryMode::Normal,
            nodemap: NodeMap::default(),
            vnnmap: VnnMap::default(),
            dbmap: DbMap::default(),
            need_recovery: false,
            need_takeover_run: false,
        }
    }
}

pub struct Coordinator {
    pub self_pnn: Pnn,
    pub tunables: Mutex<Tunables>,
    pub client: Arc<dyn PeerClient>,
    pub lock: Mutex<Box<dyn RecoveryLock>>,
    pub takeover: Arc<dyn IpTakeover>,
    pub ban_registry: Mutex<BanRegistry>,
    pub culprit: Mutex<CulpritTracker>,
    pub priority_time: Mutex<Timestamp>,
    pub cache: Mutex<CoordinatorCache>,
    pub ban_expiry_rx: Receiver<BanExpired>,
}

impl Coordinator {
    pub fn new(
        self_pnn: Pnn,
        tunables: Tunables,
        client: Arc<dyn PeerClient>,
        lock: Box<dyn RecoveryLock>,
        takeover: Arc<dyn IpTakeover>,
    ) -> Arc<Self> {
        let (expiry_tx, expiry_rx) = unbounded();
        Arc::new(Coordinator {
            self_pnn,
            tunables: Mutex::new(tunables),
            client,
            lock: Mutex::new(lock),
            takeover,
            ban_registry: Mutex::new(BanRegistry::new(self_pnn, expiry_tx)),
            culprit: Mutex::new(CulpritTracker::new()),
            priority_time: Mutex::new(now()),
            cache: Mutex::new(CoordinatorCache::new()),
            ban_expiry_rx: expiry_rx,
        })
    }

    /// Drains any auto-unban timers that have fired since the last poll
    /// (non-blocking; called once per monitor tick).
    pub fn drain_expired_bans(&self) -> Vec<Pnn> {
        let mut expired = Vec::new();
        while let Ok(BanExpired(pnn)) = self.ban_expiry_rx.try_recv() {
            expired.push(pnn);
        }
        expired
    }
}

/// Spawns the parent-death watchdog against this coordinator's configured
/// poll interval, per §5's process model.
pub fn spawn_parent_watch(monitor: Box<dyn ParentMonitor>, poll_interval: std::time::Duration) {
    crate::parent::watch(monitor, poll_interval);
}
