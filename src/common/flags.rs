//! Per-node flag bitset.
//!
//! `DISCONNECTED` is special: §4.1 requires it to be determined locally
//! only. A peer's report of a third party's `DISCONNECTED` bit is always
//! discarded in favor of the local observation; see
//! [`NodeMap::reconcile_disconnected`](super::node::NodeMap::reconcile_disconnected)
//! and the `NODE_FLAGS_CHANGED` handler in `dispatch`.

use bitflags::bitflags;

bitflags! {
    #[derive(Default)]
    pub struct NodeFlags: u32 {
        const DISCONNECTED          = 1 << 0;
        const BANNED                = 1 << 1;
        const DISABLED              = 1 << 2;
        const UNHEALTHY             = 1 << 3;
        const PERMANENTLY_DISABLED  = 1 << 4;

        const INACTIVE = Self::DISCONNECTED.bits
            | Self::BANNED.bits
            | Self::DISABLED.bits
            | Self::UNHEALTHY.bits
            | Self::PERMANENTLY_DISABLED.bits;
    }
}

impl NodeFlags {
    pub fn is_active(self) -> bool { !self.intersects(NodeFlags::INACTIVE) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_is_any_disabling_bit() {
        assert!(NodeFlags::DISCONNECTED.intersects(NodeFlags::INACTIVE));
        assert!(NodeFlags::BANNED.intersects(NodeFlags::INACTIVE));
        assert!(NodeFlags::DISABLED.intersects(NodeFlags::INACTIVE));
        assert!(NodeFlags::UNHEALTHY.intersects(NodeFlags::INACTIVE));
        assert!(NodeFlags::PERMANENTLY_DISABLED.intersects(NodeFlags::INACTIVE));
        assert!(NodeFlags::empty().is_active());
        assert!(!NodeFlags::BANNED.is_active());
    }
}
