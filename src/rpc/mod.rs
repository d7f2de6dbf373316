//! Peer client (C1): typed control requests to a peer, plus the async
//! fan-out primitive used throughout the monitor loop and recovery
//! procedure.

pub mod client;
pub mod fanout;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use client::{Destination, PeerClient, Srvid};
pub use fanout::fan_out;
