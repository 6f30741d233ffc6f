use super::*;

/// Flood-forwarding: offer every bundle to every eligible peer.
///
/// Correct whenever contact opportunities are not the bottleneck; the
/// universal sent-to filter is the only thing bounding replication.
#[derive(Default)]
pub struct Epidemic;

impl Strategy for Epidemic {
    fn name(&self) -> &'static str {
        "epidemic"
    }

    fn on_new_bundle(&self, _id: &Id, _from_local: bool) {}

    fn offer(&self, _bundle: &Bundle, _peer: &PeerInfo) -> bool {
        true
    }

    fn on_sent(&self, _id: &Id, _peer: &PeerInfo) {}

    fn on_send_failed(&self, _id: &Id, _peer: &PeerInfo) {}

    fn on_bundle_gone(&self, _id: &Id) {}
}
