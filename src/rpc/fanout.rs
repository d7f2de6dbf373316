//! The async fan-out primitive (§4.1, §9): "model each fan-out as a
//! strongly-typed aggregator `{pending: int, status: monitor_result}`;
//! each per-peer callback is a closure over that aggregator."

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::common::{MonitorResult, Pnn};
use crate::error::{RecoveryError, Result};

/// A per-call `{count, status}` callback payload, generalized into one
/// reusable type shared by every fan-out call site.
#[derive(Debug)]
pub struct FanoutAggregator {
    pending: usize,
    status: MonitorResult,
}

impl FanoutAggregator {
    pub fn new(pending: usize) -> Self { FanoutAggregator { pending, status: MonitorResult::Ok } }

    pub fn record(&mut self, result: MonitorResult) {
        self.pending = self.pending.saturating_sub(1);
        self.status = self.status.merge(result);
    }

    pub fn is_done(&self) -> bool { self.pending == 0 }

    pub fn status(&self) -> MonitorResult { self.status }
}

/// Runs `call` against every target concurrently - one helper thread per
/// target, since the RPC transport is an external, assumed-blocking
/// collaborator rather than a reactor this crate owns. Individual
/// failures never cancel siblings; the aggregate is the worst per-peer
/// `MonitorResult`. Peers that have not replied when `timeout` elapses are
/// folded in as `MonitorResult::Failed`.
pub fn fan_out<F>(targets: &[Pnn], timeout: Duration, call: F) -> MonitorResult
where
    F: Fn(Pnn) -> MonitorResult + Send + Sync + 'static,
{
    if targets.is_empty() {
        return MonitorResult::Ok;
    }

    let call = Arc::new(call);
    let (tx, rx) = bounded(targets.len());
    for &pnn in targets {
        let tx = tx.clone();
        let call = Arc::clone(&call);
        thread::spawn(move || {
            let _ = tx.send(call(pnn));
        });
    }
    drop(tx);

    let mut aggregator = FanoutAggregator::new(targets.len());
    let deadline = Instant::now() + timeout;
    while !aggregator.is_done() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            while !aggregator.is_done() {
                aggregator.record(MonitorResult::Failed);
            }
            break;
        }
        match rx.recv_timeout(remaining) {
            Ok(result) => aggregator.record(result),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    aggregator.status()
}

/// Fan out a call whose only outcomes are success or a transient RPC
/// failure - used by recovery stages, where any single peer failure aborts
/// the whole stage (§4.5). Returns the first error observed, if any.
pub fn fan_out_all_ok<F>(targets: &[Pnn], timeout: Duration, call: F) -> Result<()>
where
    F: Fn(Pnn) -> Result<()> + Send + Sync + 'static,
{
    if targets.is_empty() {
        return Ok(());
    }

    let call = Arc::new(call);
    let (tx, rx) = bounded(targets.len());
    for &pnn in targets {
        let tx = tx.clone();
        let call = Arc::clone(&call);
        thread::spawn(move || {
            let _ = tx.send(call(pnn));
        });
    }
    drop(tx);

    let mut pending = targets.len();
    let mut first_error = None;
    let deadline = Instant::now() + timeout;
    while pending > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            if first_error.is_none() {
                first_error = Some(RecoveryError::TransientRpc {
                    pnn: targets[0],
                    reason: "fan-out timed out waiting for replies".into(),
                });
            }
            break;
        }
        match rx.recv_timeout(remaining) {
            Ok(result) => {
                pending -= 1;
                if let Err(e) = result {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_picks_worst_result() {
        let targets = vec![Pnn(0), Pnn(1), Pnn(2)];
        let status = fan_out(&targets, Duration::from_secs(2), |pnn| match pnn.0 {
            0 => MonitorResult::Ok,
            1 => MonitorResult::Failed,
            _ => MonitorResult::RecoveryNeeded,
        });
        assert_eq!(status, MonitorResult::RecoveryNeeded);
    }

    #[test]
    fn fan_out_empty_targets_is_ok() {
        let status = fan_out(&[], Duration::from_secs(1), |_| MonitorResult::Failed);
        assert_eq!(status, MonitorResult::Ok);
    }

    #[test]
    fn fan_out_all_ok_surfaces_first_error() {
        let targets = vec![Pnn(0), Pnn(1)];
        let result = fan_out_all_ok(&targets, Duration::from_secs(2), |pnn| {
            if pnn == Pnn(1) {
                Err(RecoveryError::TransientRpc { pnn, reason: "boom".into() })
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn fan_out_all_ok_succeeds_when_every_peer_succeeds() {
        let targets = vec![Pnn(0), Pnn(1), Pnn(2)];
        let result = fan_out_all_ok(&targets, Duration::from_secs(2), |_| Ok(()));
        assert!(result.is_ok());
    }
}
