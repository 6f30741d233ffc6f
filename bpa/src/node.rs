use super::*;
use async_trait::async_trait;
use crate::bpv7::{
    builder::Builder,
    bundle::Bundle,
    creation_timestamp::CreationTimestamp,
    dtn_time::DtnTime,
    eid::Eid,
    status_report::{AdministrativeRecord, ReasonCode},
};
use crate::cla::{Cla, ClaAddress, Sink};
use crate::config::{Config, RoutingConfig};
use crate::fragmentation::FragmentationManager;
use crate::peer::PeerInfo;
use crate::report::StatusKind;
use crate::routing::{Engine, Epidemic, SprayAndWait, Strategy};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Weak};
use crate::store::BundleStore;

/// Counters exposed for observability.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct NodeStats {
    pub received: u64,
    pub delivered: u64,
    pub admin_records: u64,
    pub malformed: u64,
    pub hop_limit_exceeded: u64,
}

type DeliveryCallback = Box<dyn Fn(&Bundle) + Send + Sync>;

/// A DTN node: the wiring of store, fragmentation manager, routing engine
/// and convergence layers, plus the periodic cleanup and dispatch timers.
pub struct Node {
    config: Config,
    store: Arc<BundleStore>,
    fragmentation: Arc<FragmentationManager>,
    engine: Arc<Engine>,
    clas: Mutex<Vec<Arc<dyn Cla>>>,
    cancel_token: tokio_util::sync::CancellationToken,
    task_tracker: tokio_util::task::TaskTracker,
    delivery_callback: Mutex<Option<DeliveryCallback>>,
    received: AtomicU64,
    delivered: AtomicU64,
    admin_records: AtomicU64,
    malformed: AtomicU64,
    hop_limit_exceeded: AtomicU64,
}

impl Node {
    pub fn new(config: Config) -> Arc<Self> {
        let strategy: Arc<dyn Strategy> = match &config.routing {
            RoutingConfig::Epidemic => Arc::new(Epidemic),
            RoutingConfig::SprayAndWait { max_copies } => {
                Arc::new(SprayAndWait::new(*max_copies))
            }
        };
        Self::with_strategy(config, strategy)
    }

    /// Build a node around an explicitly constructed strategy, for callers
    /// that need to keep hold of the strategy's state.
    pub fn with_strategy(config: Config, strategy: Arc<dyn Strategy>) -> Arc<Self> {
        let store = Arc::new(BundleStore::new(config.store_max_bundles));
        let engine = Arc::new(Engine::new(
            config.node_id.clone(),
            strategy,
            store.clone(),
        ));
        Arc::new(Self {
            config,
            store,
            fragmentation: Arc::new(FragmentationManager::new()),
            engine,
            clas: Mutex::new(Vec::new()),
            cancel_token: tokio_util::sync::CancellationToken::new(),
            task_tracker: tokio_util::task::TaskTracker::new(),
            delivery_callback: Mutex::new(None),
            received: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            admin_records: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            hop_limit_exceeded: AtomicU64::new(0),
        })
    }

    pub fn node_id(&self) -> &Eid {
        &self.config.node_id
    }

    pub fn store(&self) -> &Arc<BundleStore> {
        &self.store
    }

    pub fn fragmentation(&self) -> &Arc<FragmentationManager> {
        &self.fragmentation
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            admin_records: self.admin_records.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            hop_limit_exceeded: self.hop_limit_exceeded.load(Ordering::Relaxed),
        }
    }

    /// Invoke `callback` for every bundle delivered to this node.
    pub fn on_delivery(&self, callback: impl Fn(&Bundle) + Send + Sync + 'static) {
        *self.delivery_callback.lock().expect("callback lock") = Some(Box::new(callback));
    }

    /// Register a convergence layer: the engine gains a sender, and the CLA
    /// gains a [`Sink`] through which it reaches back into this node.
    pub async fn register_cla(self: &Arc<Self>, cla: Arc<dyn Cla>) -> cla::Result<()> {
        let sink = Arc::new(NodeSink {
            node: Arc::downgrade(self),
        });
        cla.on_register(sink, &self.config.node_id).await?;
        self.engine.add_sender(cla.clone());
        self.clas.lock().expect("cla list lock").push(cla);
        Ok(())
    }

    /// Start the periodic cleanup and dispatch timers.
    pub fn start(self: &Arc<Self>) {
        info!("node {} starting", self.config.node_id);

        let node = self.clone();
        self.task_tracker.spawn(async move {
            let mut interval = tokio::time::interval(node.config.cleanup_interval);
            loop {
                tokio::select! {
                    _ = node.cancel_token.cancelled() => break,
                    _ = interval.tick() => node.run_cleanup(),
                }
            }
        });

        let node = self.clone();
        self.task_tracker.spawn(async move {
            let mut interval = tokio::time::interval(node.config.routing_interval);
            loop {
                tokio::select! {
                    _ = node.cancel_token.cancelled() => break,
                    _ = interval.tick() => node.engine.dispatch().await,
                }
            }
        });
    }

    /// Cancel every timer and close every convergence layer; in-flight sends
    /// may complete or fail, and no new work is accepted.
    pub async fn shutdown(&self) {
        info!("node {} stopping", self.config.node_id);
        self.cancel_token.cancel();

        let clas: Vec<Arc<dyn Cla>> =
            std::mem::take(&mut *self.clas.lock().expect("cla list lock"));
        for cla in clas {
            cla.on_unregister().await;
        }

        self.task_tracker.close();
        self.task_tracker.wait().await;
    }

    /// One expiry sweep across the store, the fragment sets and the routing
    /// descriptors.
    fn run_cleanup(&self) {
        let now = DtnTime::now();
        let bundles = self.store.cleanup(now);
        let sets = self.fragmentation.cleanup(now);
        let descriptors = self.engine.cleanup(now);
        if bundles + sets + descriptors > 0 {
            debug!(
                "cleanup: {bundles} bundles, {sets} fragment sets, {descriptors} descriptors"
            );
        }
    }

    /// Submit application data for delivery to `destination`.
    ///
    /// The bundle is constructed, fragmented at intake when it exceeds the
    /// configured fragment size, stored, and left to the routing engine.
    pub async fn send(
        &self,
        destination: Eid,
        payload: impl Into<Box<[u8]>>,
        lifetime: core::time::Duration,
    ) -> bool {
        let bundle = Builder::new(self.config.node_id.clone(), destination)
            .with_crc_type(self.config.crc_type)
            .with_lifetime(lifetime)
            .with_payload(payload)
            .build(CreationTimestamp::now());

        let local = self.config.node_id.clone();
        if let Some(max) = self.config.fragment_max_size {
            if bundle.to_cbor().len() > max {
                let fragments = self.fragmentation.fragment(&bundle, max);
                if !fragments.is_empty() {
                    let mut ok = true;
                    for fragment in fragments {
                        ok &= self
                            .engine
                            .notify_new_bundle(Arc::new(fragment), &local)
                            .await;
                    }
                    return ok;
                }
            }
        }
        self.engine.notify_new_bundle(Arc::new(bundle), &local).await
    }

    /// Record a peer contact and trigger a dispatch pass.
    pub async fn peer_appeared(&self, peer: PeerInfo) {
        self.engine.notify_peer_appeared(peer).await;
    }

    pub fn peer_disappeared(&self, eid: &Eid) {
        self.engine.notify_peer_disappeared(eid);
    }

    /// Intake for bundles arriving from a convergence layer.
    async fn handle_bundle(&self, data: Bytes, from: ClaAddress) {
        let mut bundle = match Bundle::parse(&data) {
            Ok(bundle) => bundle,
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                debug!("dropping malformed bundle from {from}: {e}");
                return;
            }
        };

        self.received.fetch_add(1, Ordering::Relaxed);
        trace!("bundle {} received from {from}", bundle.id());

        // Hop-count admission
        if let Some(info) = bundle.increment_hop_count() {
            if info.exceeded() {
                self.hop_limit_exceeded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "bundle {} exceeded its hop limit ({}/{})",
                    bundle.id(),
                    info.count,
                    info.limit
                );
                self.emit_report(&bundle, StatusKind::Deleted, ReasonCode::HopLimitExceeded)
                    .await;
                return;
            }
        }

        // The peer that handed us the bundle, for reflection suppression:
        // the previous node when stamped, else the bundle source
        let source_peer = bundle
            .previous_node()
            .cloned()
            .unwrap_or_else(|| bundle.primary.source.clone());

        self.emit_report(
            &bundle,
            StatusKind::Received,
            ReasonCode::NoAdditionalInformation,
        )
        .await;

        if bundle.is_fragment() {
            let fragment = Arc::new(bundle);
            let reassembled = self.fragmentation.add_fragment(fragment.clone());

            // The fragment itself stays in circulation
            self.engine.notify_new_bundle(fragment, &source_peer).await;

            if let Some(original) = reassembled {
                debug!("bundle {} reassembled", original.id());
                self.demux(original, &source_peer).await;
            }
            return;
        }

        self.demux(bundle, &source_peer).await;
    }

    /// Local delivery or hand-off to routing.
    async fn demux(&self, bundle: Bundle, source_peer: &Eid) {
        if bundle.primary.destination == self.config.node_id {
            self.deliver(bundle).await;
        } else {
            self.engine
                .notify_new_bundle(Arc::new(bundle), source_peer)
                .await;
        }
    }

    async fn deliver(&self, bundle: Bundle) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        info!("bundle {} delivered", bundle.id());

        if bundle.is_admin_record() {
            self.admin_records.fetch_add(1, Ordering::Relaxed);
            match bundle.payload().map(AdministrativeRecord::parse) {
                Some(Ok(record)) => debug!("administrative record: {record:?}"),
                _ => debug!("undecodable administrative record"),
            }
        } else if let Some(callback) = &*self.delivery_callback.lock().expect("callback lock") {
            callback(&bundle);
        }

        self.emit_report(
            &bundle,
            StatusKind::Delivered,
            ReasonCode::NoAdditionalInformation,
        )
        .await;

        // Delivered bundles do not linger in the store
        self.store.remove(&bundle.id());
    }

    async fn emit_report(&self, subject: &Bundle, kind: StatusKind, reason: ReasonCode) {
        if !self.config.status_reports {
            return;
        }
        if let Some(report) = report::new_status_report(
            subject,
            kind,
            reason,
            &self.config.node_id,
            DtnTime::now(),
        ) {
            self.engine
                .notify_new_bundle(Arc::new(report), &self.config.node_id)
                .await;
        }
    }
}

/// The capability a registered CLA uses to reach back into its node.
///
/// Holds the node weakly: the node owns its CLAs, never the reverse.
struct NodeSink {
    node: Weak<Node>,
}

#[async_trait]
impl Sink for NodeSink {
    async fn dispatch(&self, data: Bytes, from: ClaAddress) {
        if let Some(node) = self.node.upgrade() {
            node.handle_bundle(data, from).await;
        }
    }

    async fn add_peer(&self, eid: Eid, addr: ClaAddress) {
        if let Some(node) = self.node.upgrade() {
            node.peer_appeared(PeerInfo::new(eid, addr)).await;
        }
    }

    async fn remove_peer(&self, eid: &Eid) {
        if let Some(node) = self.node.upgrade() {
            node.peer_disappeared(eid);
        }
    }
}
