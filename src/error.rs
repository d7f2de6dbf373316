//! Error taxonomy for the recovery coordinator.
//!
//! Each kind drives a different reaction in the monitor loop: continue to
//! the next tick, force an election, force a recovery run, or abort the
//! process outright.

use thiserror::Error;

use crate::common::Pnn;

#[derive(Debug, Error)]
pub enum RecoveryError {
    /// A peer RPC timed out or the peer did not respond at all.
    #[error("transient RPC failure talking to node {pnn}: {reason}")]
    TransientRpc { pnn: Pnn, reason: String },

    /// A peer reported state that disagrees with our local view.
    #[error("node {pnn} disagrees with local state: {reason}")]
    Disagreement { pnn: Pnn, reason: String },

    /// A structural invariant (map sizes, flag consistency, ...) was
    /// violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The recovery-master lock was lost or could not be acquired.
    #[error("recovery lock lost: {0}")]
    LockLost(String),

    /// Something that should be impossible happened (allocation failure,
    /// programmer error). The only correct response is to abort.
    #[error("fatal internal error: {0}")]
    FatalInternal(String),
}

impl RecoveryError {
    /// Whether this error should abort the process rather than restart the
    /// monitor tick (§7: `FatalInternal` is the only unrecoverable kind).
    pub fn is_fatal(&self) -> bool { matches!(self, RecoveryError::FatalInternal(_)) }
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
