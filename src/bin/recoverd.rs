//! CLI entry point. Parses `Tunables` plus the handful of flags that are
//! not cluster-wide tunables (this node's pnn, log level, lock file path),
//! initializes logging, builds a `Coordinator`, spawns the parent-death
//! watchdog, and runs the monitor loop forever.
//!
//! The peer RPC transport is an external collaborator out of scope for
//! this crate (spec §1); this binary wires the coordinator to the
//! in-process mock cluster it ships for tests, seeded with only this
//! node's own state, so the binary demonstrates the full ambient stack
//! (CLI, logging, lock, parent-watch, monitor loop) end to end without
//! fabricating a network protocol. A real deployment links against the
//! `recoverd` library and supplies its own `Arc<dyn PeerClient>`.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use log::{info, LevelFilter};
use structopt::StructOpt;

use recoverd::common::{Node, NodeFlags, NodeMap, Pnn};
use recoverd::config::Tunables;
use recoverd::coordinator::Coordinator;
use recoverd::lock::unix::FlockRecoveryLock;
use recoverd::logging;
use recoverd::monitor::run_forever;
use recoverd::rpc::mock::{MockCluster, MockNodeState};
use recoverd::takeover::NullIpTakeover;

#[derive(Debug, StructOpt)]
#[structopt(name = "recoverd", about = "Recovery coordinator for a clustered key/value service")]
struct Opt {
    /// This node's physical node number.
    #[structopt(long)]
    pnn: u32,

    /// Path to the cluster-wide recovery lock file.
    #[structopt(long, default_value = "/var/lib/recoverd/recovery.lock")]
    lock_path: PathBuf,

    /// Log verbosity (off, error, warn, info, debug, trace).
    #[structopt(long, default_value = "info")]
    log_level: String,

    /// Read end of the pipe inherited from the parent daemon; its
    /// read-readiness (EOF) means the parent died (§5). Left unset when run
    /// standalone, e.g. under a supervisor that doesn't pass one down.
    #[structopt(long)]
    parent_fd: Option<i32>,

    #[structopt(flatten)]
    tunables: Tunables,
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    let level = LevelFilter::from_str(&opt.log_level).unwrap_or(LevelFilter::Info);
    logging::init(level)?;

    let self_pnn = Pnn(opt.pnn);
    info!(target: "recoverd::main", "starting recovery coordinator as node {}", self_pnn);

    let cluster = MockCluster::new();
    let nodemap = NodeMap::new(vec![Node {
        pnn: self_pnn,
        flags: NodeFlags::empty(),
        address: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 4000 + opt.pnn as u16),
    }]);
    cluster.insert(self_pnn, MockNodeState::new(nodemap.clone(), Default::default(), Default::default(), opt.tunables.clone()));
    cluster.with_node_mut(self_pnn, |n| n.recmaster = Some(self_pnn));
    let client = Arc::new(cluster.client());

    let lock = Box::new(FlockRecoveryLock::new(opt.lock_path));
    let takeover = Arc::new(NullIpTakeover);

    let coordinator = Coordinator::new(self_pnn, opt.tunables, client, lock, takeover);
    coordinator.cache.lock().unwrap().nodemap = nodemap;
    coordinator.cache.lock().unwrap().recmaster = Some(self_pnn);

    #[cfg(unix)]
    if let Some(fd) = opt.parent_fd {
        let monitor = Box::new(recoverd::parent::unix::PipeParentMonitor::new(fd));
        recoverd::coordinator::spawn_parent_watch(monitor, coordinator.tunables.lock().unwrap().recover_interval());
    }

    run_forever(coordinator);
}
