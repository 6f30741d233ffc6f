use super::*;

pub const DEFAULT_MAX_COPIES: u32 = 6;

/// Spray-and-wait: quota-limited flooding.
///
/// Each bundle holds an integer copy count in a side table. While more than
/// one copy remains (the spray phase) the bundle may be offered to any peer;
/// a successful transmission gives the peer half the copies. With one copy
/// left (the wait phase) the bundle is only ever handed to its destination.
///
/// The count is not carried on the wire, so a bundle received from a remote
/// peer starts at half the configured maximum.
pub struct SprayAndWait {
    max_copies: u32,
    copies: Mutex<HashMap<Id, u32>>,
}

impl Default for SprayAndWait {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COPIES)
    }
}

impl SprayAndWait {
    pub fn new(max_copies: u32) -> Self {
        Self {
            max_copies: max_copies.max(1),
            copies: Mutex::new(HashMap::new()),
        }
    }

    /// The copies this node currently holds for a bundle.
    pub fn copy_count(&self, id: &Id) -> u32 {
        self.copies
            .lock()
            .expect("copy table lock")
            .get(id)
            .copied()
            .unwrap_or(1)
    }
}

impl Strategy for SprayAndWait {
    fn name(&self) -> &'static str {
        "spray-and-wait"
    }

    fn on_new_bundle(&self, id: &Id, from_local: bool) {
        let count = if from_local {
            self.max_copies
        } else {
            (self.max_copies / 2).max(1)
        };
        self.copies
            .lock()
            .expect("copy table lock")
            .insert(id.clone(), count);
        trace!("bundle {id} starts with {count} copies");
    }

    fn offer(&self, bundle: &Bundle, peer: &PeerInfo) -> bool {
        if self.copy_count(&bundle.id()) > 1 {
            true
        } else {
            // Wait phase: direct delivery only
            bundle.primary.destination == peer.eid
        }
    }

    fn on_sent(&self, id: &Id, peer: &PeerInfo) {
        let mut copies = self.copies.lock().expect("copy table lock");
        let count = copies.get(id).copied().unwrap_or(1);
        if count > 1 {
            let granted = count / 2;
            let kept = count - granted;
            copies.insert(id.clone(), kept);
            trace!("sprayed {id} to {}: granted {granted}, kept {kept}", peer.eid);
        }
    }

    fn on_send_failed(&self, _id: &Id, _peer: &PeerInfo) {
        // No copy was spent; nothing to restore
    }

    fn on_bundle_gone(&self, id: &Id) {
        self.copies.lock().expect("copy table lock").remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpv7::builder::Builder;
    use crate::bpv7::creation_timestamp::CreationTimestamp;
    use crate::cla::ClaAddress;

    fn test_bundle(destination: &str) -> Bundle {
        Builder::new("dtn://a/".parse().unwrap(), destination.parse().unwrap())
            .with_payload(b"payload".as_slice())
            .build(CreationTimestamp::now())
    }

    fn test_peer(eid: &str) -> PeerInfo {
        PeerInfo::new(
            eid.parse().unwrap(),
            ClaAddress::Tcp("127.0.0.1:4556".parse().unwrap()),
        )
    }

    #[test]
    fn copies_halve_on_each_spray() {
        let spray = SprayAndWait::new(4);
        let bundle = test_bundle("dtn://b/");
        let id = bundle.id();

        spray.on_new_bundle(&id, true);
        assert_eq!(spray.copy_count(&id), 4);

        let r1 = test_peer("dtn://r1/");
        assert!(spray.offer(&bundle, &r1));
        spray.on_sent(&id, &r1);
        assert_eq!(spray.copy_count(&id), 2);

        let r2 = test_peer("dtn://r2/");
        assert!(spray.offer(&bundle, &r2));
        spray.on_sent(&id, &r2);
        assert_eq!(spray.copy_count(&id), 1);

        // Wait phase: only the destination is eligible
        assert!(!spray.offer(&bundle, &test_peer("dtn://r3/")));
        assert!(spray.offer(&bundle, &test_peer("dtn://b/")));
    }

    #[test]
    fn received_bundles_start_with_half() {
        let spray = SprayAndWait::new(6);
        let id = test_bundle("dtn://b/").id();
        spray.on_new_bundle(&id, false);
        assert_eq!(spray.copy_count(&id), 3);
    }

    #[test]
    fn max_copies_one_degenerates_to_direct_delivery() {
        let spray = SprayAndWait::new(1);
        let bundle = test_bundle("dtn://b/");
        spray.on_new_bundle(&bundle.id(), true);

        assert!(!spray.offer(&bundle, &test_peer("dtn://r1/")));
        assert!(spray.offer(&bundle, &test_peer("dtn://b/")));
    }

    #[test]
    fn failed_sends_spend_nothing() {
        let spray = SprayAndWait::new(4);
        let bundle = test_bundle("dtn://b/");
        let id = bundle.id();
        spray.on_new_bundle(&id, true);

        let peer = test_peer("dtn://r1/");
        assert!(spray.offer(&bundle, &peer));
        spray.on_send_failed(&id, &peer);
        assert_eq!(spray.copy_count(&id), 4);
    }

    #[test]
    fn state_is_dropped_with_the_bundle() {
        let spray = SprayAndWait::new(4);
        let id = test_bundle("dtn://b/").id();
        spray.on_new_bundle(&id, true);
        assert_eq!(spray.copy_count(&id), 4);

        spray.on_bundle_gone(&id);
        assert_eq!(spray.copy_count(&id), 1);
    }
}
