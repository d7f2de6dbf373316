//! Tunables consumed by the coordinator (§6). Parsed by the `recoverd`
//! binary's `structopt` CLI and threaded through as plain data - the core
//! modules never read the environment or argv directly.

use std::time::Duration;

use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
pub struct Tunables {
    /// Monitor loop period, in seconds.
    #[structopt(long, default_value = "1")]
    pub recover_interval: u64,

    /// Per-RPC control timeout, in seconds.
    #[structopt(long, default_value = "10")]
    pub recover_timeout: u64,

    /// How long a forced election waits to collect responses, in seconds.
    #[structopt(long, default_value = "5")]
    pub election_timeout: u64,

    /// Window within which repeated recoveries blamed on the same culprit
    /// accumulate toward an auto-ban, in seconds.
    #[structopt(long, default_value = "120")]
    pub recovery_grace_period: u64,

    /// Duration of an auto-ban triggered by the culprit counter, in
    /// seconds.
    #[structopt(long, default_value = "300")]
    pub recovery_ban_period: u64,

    /// Cooldown observed after a recovery completes before another one can
    /// start, in seconds.
    #[structopt(long, default_value = "10")]
    pub rerecovery_timeout: u64,

    /// Whether bans are honored at all; `ban()` is a no-op when false.
    #[structopt(long)]
    pub enable_bans: bool,

    /// Whether the public-IP-takeover collaborator should be invoked.
    #[structopt(long)]
    pub public_ip_enabled: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            recover_interval: 1,
            recover_timeout: 10,
            election_timeout: 5,
            recovery_grace_period: 120,
            recovery_ban_period: 300,
            rerecovery_timeout: 10,
            enable_bans: true,
            public_ip_enabled: false,
        }
    }
}

impl Tunables {
    pub fn recover_interval(&self) -> Duration { Duration::from_secs(self.recover_interval) }

    pub fn recover_timeout(&self) -> Duration { Duration::from_secs(self.recover_timeout) }

    pub fn election_timeout(&self) -> Duration { Duration::from_secs(self.election_timeout) }

    pub fn rerecovery_timeout(&self) -> Duration { Duration::from_secs(self.rerecovery_timeout) }
}
