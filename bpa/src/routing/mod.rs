use super::*;
use crate::bpv7::{
    bundle::{Bundle, Id},
    dtn_time::DtnTime,
    eid::Eid,
};
use crate::cla::{Cla, SendResult};
use crate::peer::PeerInfo;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use crate::store::BundleStore;

mod epidemic;
mod spray;

pub use epidemic::Epidemic;
pub use spray::SprayAndWait;

/// Per-bundle routing bookkeeping.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub id: Id,
    pub destination: Eid,
    pub sent_to: HashSet<Eid>,
    pub expiry: DtnTime,
}

impl Descriptor {
    fn new(bundle: &Bundle) -> Self {
        Self {
            id: bundle.id(),
            destination: bundle.primary.destination.clone(),
            sent_to: HashSet::new(),
            expiry: bundle.expiry(),
        }
    }
}

/// Counters exposed for observability.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RoutingStats {
    pub sent: u64,
    pub failed: u64,
}

/// A forwarding strategy plugged into the [`Engine`].
///
/// The engine applies the universal filters (expired, locally destined,
/// already sent to the peer) before consulting the strategy; the strategy
/// only adds its own policy on top and keeps whatever per-bundle state that
/// policy needs.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// A bundle has entered the store. `from_local` is true when this node
    /// is its source.
    fn on_new_bundle(&self, id: &Id, from_local: bool);

    /// Whether to offer `bundle` to `peer` this pass.
    fn offer(&self, bundle: &Bundle, peer: &PeerInfo) -> bool;

    /// A transmission to `peer` succeeded.
    fn on_sent(&self, id: &Id, peer: &PeerInfo);

    /// A transmission to `peer` failed; any state charged for the attempt
    /// must be restored.
    fn on_send_failed(&self, id: &Id, peer: &PeerInfo);

    /// A bundle has left the system; drop any state for it.
    fn on_bundle_gone(&self, id: &Id);
}

type SentTrace = Box<dyn Fn(&Bundle, &PeerInfo) + Send + Sync>;

/// The per-bundle dispatch engine.
///
/// Owns the descriptor and peer tables; holds shared references to the
/// bundles it schedules, never copies. Each table has its own lock and no
/// lock is held across a transmission.
pub struct Engine {
    local: Eid,
    strategy: Arc<dyn Strategy>,
    store: Arc<BundleStore>,
    senders: Mutex<Vec<Arc<dyn Cla>>>,
    descriptors: Mutex<HashMap<Id, Descriptor>>,
    peers: Mutex<HashMap<Eid, PeerInfo>>,
    sent_trace: Mutex<Option<SentTrace>>,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl Engine {
    pub fn new(local: Eid, strategy: Arc<dyn Strategy>, store: Arc<BundleStore>) -> Self {
        Self {
            local,
            strategy,
            store,
            senders: Mutex::new(Vec::new()),
            descriptors: Mutex::new(HashMap::new()),
            peers: Mutex::new(HashMap::new()),
            sent_trace: Mutex::new(None),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Invoke `trace` after every successful transmission.
    pub fn on_bundle_sent(&self, trace: impl Fn(&Bundle, &PeerInfo) + Send + Sync + 'static) {
        *self.sent_trace.lock().expect("trace lock") = Some(Box::new(trace));
    }

    /// Register a convergence layer the engine may transmit through.
    pub fn add_sender(&self, cla: Arc<dyn Cla>) {
        self.senders.lock().expect("senders lock").push(cla);
    }

    /// Place a bundle under routing control: store it, create its
    /// descriptor, and record `source` as already having the bundle so it is
    /// never reflected back.
    ///
    /// Returns false when the store rejects the bundle.
    pub async fn notify_new_bundle(&self, bundle: Arc<Bundle>, source: &Eid) -> bool {
        if !self.store.push(bundle.clone()) {
            debug!("store rejected bundle {}", bundle.id());
            return false;
        }

        let id = bundle.id();
        let from_local = *source == self.local;
        {
            let mut descriptors = self.descriptors.lock().expect("descriptors lock");
            let descriptor = descriptors
                .entry(id.clone())
                .or_insert_with(|| Descriptor::new(&bundle));
            descriptor.sent_to.insert(source.clone());
        }
        self.strategy.on_new_bundle(&id, from_local);
        trace!("bundle {id} under {} routing", self.strategy.name());
        true
    }

    /// Record `peer` in the peer table and run a dispatch pass.
    pub async fn notify_peer_appeared(&self, peer: PeerInfo) {
        info!("peer appeared: {} at {}", peer.eid, peer.cla_addr);
        self.peers
            .lock()
            .expect("peer table lock")
            .insert(peer.eid.clone(), peer);
        self.dispatch().await;
    }

    pub fn notify_peer_disappeared(&self, eid: &Eid) {
        info!("peer disappeared: {eid}");
        self.peers.lock().expect("peer table lock").remove(eid);
    }

    /// Iterate current bundles against active peers, transmitting wherever
    /// the filters and the strategy allow.
    pub async fn dispatch(&self) {
        let bundles = self.store.get_all();
        let peers: Vec<PeerInfo> = self
            .peers
            .lock()
            .expect("peer table lock")
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect();
        if bundles.is_empty() || peers.is_empty() {
            return;
        }
        trace!("dispatching {} bundles to {} peers", bundles.len(), peers.len());

        let now = DtnTime::now();
        for bundle in bundles {
            let id = bundle.id();

            if bundle.is_expired_at(now) {
                continue;
            }
            if bundle.primary.destination == self.local {
                continue;
            }

            for peer in &peers {
                let already_sent = self
                    .descriptors
                    .lock()
                    .expect("descriptors lock")
                    .get(&id)
                    .is_some_and(|d| d.sent_to.contains(&peer.eid));
                if already_sent {
                    continue;
                }

                if !self.strategy.offer(&bundle, peer) {
                    continue;
                }

                if self.send_bundle(&bundle, peer).await {
                    let mut descriptors = self.descriptors.lock().expect("descriptors lock");
                    descriptors
                        .entry(id.clone())
                        .or_insert_with(|| Descriptor::new(&bundle))
                        .sent_to
                        .insert(peer.eid.clone());
                    drop(descriptors);

                    self.strategy.on_sent(&id, peer);
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    if let Some(trace) = &*self.sent_trace.lock().expect("trace lock") {
                        trace(&bundle, peer);
                    }
                    info!("bundle {id} sent to {}", peer.eid);
                } else {
                    // The descriptor is untouched; the peer stays a
                    // candidate for the next pass
                    self.strategy.on_send_failed(&id, peer);
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    debug!("failed to send bundle {id} to {}", peer.eid);
                }
            }
        }
    }

    /// Transmit one bundle to one peer through the first reachable
    /// convergence layer.
    ///
    /// The transmitted image carries this node as the previous node and a
    /// refreshed bundle age; the stored bundle is left untouched.
    async fn send_bundle(&self, bundle: &Bundle, peer: &PeerInfo) -> bool {
        let senders: Vec<Arc<dyn Cla>> = self.senders.lock().expect("senders lock").clone();

        for sender in senders {
            if !sender.is_reachable(&peer.cla_addr).await {
                continue;
            }

            let mut outgoing = bundle.clone();
            outgoing.set_previous_node(self.local.clone());
            outgoing.refresh_age(DtnTime::now());
            let data = Bytes::from(outgoing.to_cbor());

            return match sender.send(data, &peer.cla_addr).await {
                Ok(SendResult::Sent) => true,
                Ok(SendResult::Unreachable) => {
                    debug!("{} no longer reachable", peer.cla_addr);
                    false
                }
                Err(e) => {
                    debug!("send to {} failed: {e}", peer.cla_addr);
                    false
                }
            };
        }

        debug!("no convergence layer reaches {}", peer.cla_addr);
        false
    }

    /// Drop descriptors for bundles that have expired or left the store;
    /// returns the count removed.
    pub fn cleanup(&self, now: DtnTime) -> usize {
        let mut gone = Vec::new();
        {
            let mut descriptors = self.descriptors.lock().expect("descriptors lock");
            descriptors.retain(|id, d| {
                if now > d.expiry || !self.store.has(id) {
                    gone.push(id.clone());
                    false
                } else {
                    true
                }
            });
        }
        for id in &gone {
            self.strategy.on_bundle_gone(id);
        }
        gone.len()
    }

    /// Snapshot of one bundle's routing bookkeeping.
    pub fn descriptor(&self, id: &Id) -> Option<Descriptor> {
        self.descriptors
            .lock()
            .expect("descriptors lock")
            .get(id)
            .cloned()
    }

    /// Snapshot of the currently active peers.
    pub fn active_peers(&self) -> Vec<PeerInfo> {
        self.peers
            .lock()
            .expect("peer table lock")
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect()
    }

    pub fn local_node(&self) -> &Eid {
        &self.local
    }

    pub fn stats(&self) -> RoutingStats {
        RoutingStats {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
