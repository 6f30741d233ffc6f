use super::*;
use crate::bpv7::{dtn_time::DtnTime, eid::Eid};
use crate::cla::ClaAddress;

/// A peer is considered active only if seen within this window.
pub const ACTIVE_WINDOW: core::time::Duration = core::time::Duration::from_secs(5 * 60);

/// What the node knows about a neighbouring DTN node.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub eid: Eid,
    pub cla_addr: ClaAddress,
    pub last_seen: DtnTime,
    pub discovered_at: DtnTime,
    pub reachable: bool,
}

impl PeerInfo {
    pub fn new(eid: Eid, cla_addr: ClaAddress) -> Self {
        let now = DtnTime::now();
        Self {
            eid,
            cla_addr,
            last_seen: now,
            discovered_at: now,
            reachable: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(DtnTime::now())
    }

    pub fn is_active_at(&self, now: DtnTime) -> bool {
        self.reachable && now.duration_since(self.last_seen) < ACTIVE_WINDOW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_peer() -> PeerInfo {
        PeerInfo::new(
            "dtn://peer/".parse().unwrap(),
            ClaAddress::Tcp("127.0.0.1:4556".parse().unwrap()),
        )
    }

    #[test]
    fn freshly_seen_peers_are_active() {
        assert!(test_peer().is_active());
    }

    #[test]
    fn stale_or_unreachable_peers_are_not() {
        let peer = test_peer();
        let later = peer.last_seen.saturating_add(ACTIVE_WINDOW * 2);
        assert!(!peer.is_active_at(later));

        let mut peer = test_peer();
        peer.reachable = false;
        assert!(!peer.is_active());
    }
}
