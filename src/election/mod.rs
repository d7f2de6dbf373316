//! Election engine (C3), §4.3.

use std::io::{self, Read, Write};

use log::info;

use crate::common::{wire::{Deserial, Serial}, NodeFlags, NodeMap, Pnn, Timestamp};
use crate::error::Result;
use crate::rpc::client::{Destination, PeerClient, Srvid};

/// `{num_connected, priority_time, pnn, node_flags}`, carried on
/// `srvid = RECOVERY` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionMessage {
    pub num_connected: u32,
    pub priority_time: Timestamp,
    pub pnn: Pnn,
    pub node_flags: NodeFlags,
}

impl Serial for ElectionMessage {
    fn serial<W: Write>(&self, target: &mut W) -> io::Result<()> {
        self.num_connected.serial(target)?;
        (self.priority_time.as_millis() as u64).serial(target)?;
        self.pnn.serial(target)?;
        self.node_flags.bits().serial(target)?;
        Ok(())
    }
}

impl Deserial for ElectionMessage {
    fn deserial<R: Read>(source: &mut R) -> io::Result<Self> {
        let num_connected = u32::deserial(source)?;
        let priority_time = Timestamp::from_millis(u64::deserial(source)? as u128);
        let pnn = Pnn::deserial(source)?;
        let node_flags = NodeFlags::from_bits_truncate(u32::deserial(source)?);
        Ok(ElectionMessage { num_connected, priority_time, pnn, node_flags })
    }
}

impl ElectionMessage {
    /// Builds this node's election data from its own point of view.
    pub fn for_self(self_pnn: Pnn, priority_time: Timestamp, self_flags: NodeFlags, nodemap: &NodeMap) -> Self {
        ElectionMessage {
            num_connected: nodemap.num_connected() as u32,
            priority_time,
            pnn: self_pnn,
            node_flags: self_flags,
        }
    }
}

/// Lexicographic tie-break, first differentiator wins (§4.3):
/// 1. `me` banned => lose unconditionally.
/// 2. `peer` banned => win unconditionally.
/// 3. higher `num_connected` wins.
/// 4. earlier (smaller) `priority_time` wins.
/// 5. higher `pnn` wins.
pub fn beats(me: &ElectionMessage, peer: &ElectionMessage) -> bool {
    if me.node_flags.contains(NodeFlags::BANNED) {
        return false;
    }
    if peer.node_flags.contains(NodeFlags::BANNED) {
        return true;
    }
    if me.num_connected != peer.num_connected {
        return me.num_connected > peer.num_connected;
    }
    if me.priority_time != peer.priority_time {
        return me.priority_time < peer.priority_time;
    }
    me.pnn > peer.pnn
}

/// Broadcasts our own election message to `ALL`, and sets `recmaster =
/// self` locally first.
pub fn send_election(
    client: &dyn PeerClient,
    self_pnn: Pnn,
    priority_time: Timestamp,
    self_flags: NodeFlags,
    nodemap: &NodeMap,
) -> Result<()> {
    client.set_recmaster(self_pnn, self_pnn)?;

    let em = ElectionMessage::for_self(self_pnn, priority_time, self_flags, nodemap);
    let mut payload = Vec::new();
    em.serial(&mut payload).expect("writing to a Vec is infallible");

    info!(target: "recoverd::election", "node {} sending election request (num_connected={})", self_pnn, em.num_connected);
    client.send_message(Destination::All, Srvid::Recovery, payload)
}

/// Outcome of handling an incoming election message: either we re-asserted
/// our own candidacy, or we conceded and should adopt `them` as recmaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    WonReassert,
    Conceded { new_recmaster: Pnn },
}

/// Handles an incoming election message. If we win, we resend our own
/// election (and nothing else - we do *not*
/// also `unban_all`). If we lose, the caller is expected to release the
/// recovery lock (if held) and clear bans/culprit tracking.
pub fn handle_election(
    client: &dyn PeerClient,
    self_pnn: Pnn,
    priority_time: Timestamp,
    self_flags: NodeFlags,
    nodemap: &NodeMap,
    them: &ElectionMessage,
) -> Result<ElectionOutcome> {
    let me = ElectionMessage::for_self(self_pnn, priority_time, self_flags, nodemap);
    if beats(&me, them) {
        send_election(client, self_pnn, priority_time, self_flags, nodemap)?;
        Ok(ElectionOutcome::WonReassert)
    } else {
        client.set_recmaster(self_pnn, them.pnn)?;
        Ok(ElectionOutcome::Conceded { new_recmaster: them.pnn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(num_connected: u32, priority_ms: u128, pnn: u32, flags: NodeFlags) -> ElectionMessage {
        ElectionMessage { num_connected, priority_time: Timestamp::from_millis(priority_ms), pnn: Pnn(pnn), node_flags: flags }
    }

    #[test]
    fn banned_node_always_loses() {
        let me = msg(10, 0, 9, NodeFlags::BANNED);
        let peer = msg(0, 1000, 0, NodeFlags::empty());
        assert!(!beats(&me, &peer));
    }

    #[test]
    fn peer_banned_means_we_always_win() {
        let me = msg(0, 1000, 0, NodeFlags::empty());
        let peer = msg(10, 0, 9, NodeFlags::BANNED);
        assert!(beats(&me, &peer));
    }

    #[test]
    fn more_connected_wins() {
        let me = msg(3, 500, 1, NodeFlags::empty());
        let peer = msg(2, 500, 1, NodeFlags::empty());
        assert!(beats(&me, &peer));
        assert!(!beats(&peer, &me));
    }

    #[test]
    fn tie_on_connected_falls_back_to_priority_time() {
        let older = msg(2, 100, 1, NodeFlags::empty());
        let younger = msg(2, 200, 1, NodeFlags::empty());
        assert!(beats(&older, &younger));
        assert!(!beats(&younger, &older));
    }

    #[test]
    fn full_tie_falls_back_to_pnn() {
        let low = msg(2, 100, 1, NodeFlags::empty());
        let high = msg(2, 100, 9, NodeFlags::empty());
        assert!(beats(&high, &low));
        assert!(!beats(&low, &high));
    }

    #[test]
    fn beats_is_anti_symmetric_and_total_when_unbanned_and_distinct_pnn() {
        // anti-symmetric and total for any two unbanned, distinctly-pnn'd candidates
        let cases = [
            (msg(1, 10, 1, NodeFlags::empty()), msg(2, 20, 2, NodeFlags::empty())),
            (msg(5, 10, 1, NodeFlags::empty()), msg(5, 10, 2, NodeFlags::empty())),
            (msg(3, 7, 4, NodeFlags::empty()), msg(3, 7, 9, NodeFlags::empty())),
        ];
        for (a, b) in cases.iter() {
            assert_ne!(beats(a, b), beats(b, a));
        }
    }

    #[test]
    fn election_message_round_trips_over_the_wire() {
        use crate::common::wire::{Deserial, Serial};
        let em = msg(4, 123_456, 7, NodeFlags::BANNED);
        let mut buf = Vec::new();
        em.serial(&mut buf).unwrap();
        let mut cursor = &buf[..];
        let decoded = ElectionMessage::deserial(&mut cursor).unwrap();
        assert_eq!(decoded, em);
    }
}
