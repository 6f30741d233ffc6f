//! End-to-end scenarios over an in-memory convergence layer.

use async_trait::async_trait;
use bytes::Bytes;
use sojourn_bpa::cla::{Cla, ClaAddress, Result as ClaResult, SendResult, Sink};
use sojourn_bpa::config::{Config, RoutingConfig};
use sojourn_bpa::node::Node;
use sojourn_bpa::peer::PeerInfo;
use sojourn_bpa::routing::SprayAndWait;
use sojourn_bpv7::eid::Eid;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Wiring shared by every in-memory CLA in one test network.
type Registry = Arc<Mutex<HashMap<ClaAddress, Arc<dyn Sink>>>>;

/// A loopback convergence layer: `send` hands the bytes straight to the
/// sink registered for the target address.
struct MemCla {
    addr: ClaAddress,
    registry: Registry,
}

impl MemCla {
    fn new(port: u16, registry: &Registry) -> Arc<Self> {
        Arc::new(Self {
            addr: ClaAddress::Tcp(([127, 0, 0, 1], port).into()),
            registry: registry.clone(),
        })
    }
}

#[async_trait]
impl Cla for MemCla {
    async fn on_register(&self, sink: Arc<dyn Sink>, _node_id: &Eid) -> ClaResult<()> {
        self.registry.lock().unwrap().insert(self.addr, sink);
        Ok(())
    }

    async fn on_unregister(&self) {
        self.registry.lock().unwrap().remove(&self.addr);
    }

    async fn send(&self, data: Bytes, addr: &ClaAddress) -> ClaResult<SendResult> {
        let sink = self.registry.lock().unwrap().get(addr).cloned();
        match sink {
            Some(sink) => {
                sink.dispatch(data, self.addr).await;
                Ok(SendResult::Sent)
            }
            None => Ok(SendResult::Unreachable),
        }
    }

    async fn is_reachable(&self, addr: &ClaAddress) -> bool {
        self.registry.lock().unwrap().contains_key(addr)
    }

    async fn address(&self) -> Option<ClaAddress> {
        Some(self.addr)
    }
}

struct TestNode {
    node: Arc<Node>,
    addr: ClaAddress,
    delivered: Arc<Mutex<Vec<Vec<u8>>>>,
}

async fn spawn_node(
    registry: &Registry,
    eid: &str,
    port: u16,
    mut config: Config,
) -> TestNode {
    config.node_id = eid.parse().unwrap();
    let node = Node::new(config);
    finish_node(registry, node, port).await
}

async fn finish_node(registry: &Registry, node: Arc<Node>, port: u16) -> TestNode {
    let cla = MemCla::new(port, registry);
    let addr = cla.address().await.unwrap();
    node.register_cla(cla).await.unwrap();

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    node.on_delivery(move |bundle| {
        sink.lock()
            .unwrap()
            .push(bundle.payload().unwrap_or_default().to_vec());
    });

    TestNode {
        node,
        addr,
        delivered,
    }
}

fn peer(of: &TestNode) -> PeerInfo {
    PeerInfo::new(of.node.node_id().clone(), of.addr)
}

#[tokio::test]
async fn direct_delivery_epidemic() {
    let registry = Registry::default();
    let a = spawn_node(&registry, "dtn://a/", 5001, Config::default()).await;
    let b = spawn_node(&registry, "dtn://b/", 5002, Config::default()).await;

    let sent_events = Arc::new(Mutex::new(Vec::new()));
    let events = sent_events.clone();
    a.node.engine().on_bundle_sent(move |bundle, peer| {
        events
            .lock()
            .unwrap()
            .push((bundle.id(), peer.eid.clone()));
    });

    let payload = vec![0x42u8; 512];
    assert!(
        a.node
            .send(
                b.node.node_id().clone(),
                payload.clone().into_boxed_slice(),
                core::time::Duration::from_secs(3600),
            )
            .await
    );
    assert_eq!(a.node.store().len(), 1);

    // Peer B appears to A, which dispatches immediately
    a.node.peer_appeared(peer(&b)).await;

    assert_eq!(a.node.engine().stats().sent, 1);
    let b_stats = b.node.stats();
    assert_eq!(b_stats.received, 1);
    assert_eq!(b_stats.delivered, 1);
    assert_eq!(*b.delivered.lock().unwrap(), vec![payload]);

    // The bundle stays in A's store until cleanup expires it
    assert_eq!(a.node.store().len(), 1);

    // One bundle-sent trace, naming B
    let events = sent_events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(&events[0].1, b.node.node_id());

    // A second pass does not resend
    a.node.peer_appeared(peer(&b)).await;
    assert_eq!(a.node.engine().stats().sent, 1);
}

#[tokio::test]
async fn two_hop_relay_epidemic() {
    let registry = Registry::default();
    let a = spawn_node(&registry, "dtn://a/", 5011, Config::default()).await;
    let r = spawn_node(&registry, "dtn://r/", 5012, Config::default()).await;
    let b = spawn_node(&registry, "dtn://b/", 5013, Config::default()).await;

    assert!(
        a.node
            .send(
                b.node.node_id().clone(),
                b"via relay".as_slice(),
                core::time::Duration::from_secs(3600),
            )
            .await
    );
    let id = a.node.store().get_all()[0].id();

    // R meets A; A forwards, R stores
    a.node.peer_appeared(peer(&r)).await;
    assert_eq!(r.node.stats().received, 1);
    assert!(r.node.store().has(&id));

    // R meets B; R forwards, B delivers
    r.node.peer_appeared(peer(&b)).await;
    assert_eq!(b.node.stats().delivered, 1);
    assert_eq!(*b.delivered.lock().unwrap(), vec![b"via relay".to_vec()]);

    // R's bookkeeping: the bundle came from A and went to B
    let descriptor = r.node.engine().descriptor(&id).unwrap();
    assert!(descriptor.sent_to.contains(a.node.node_id()));
    assert!(descriptor.sent_to.contains(b.node.node_id()));

    // B never reflects the bundle back to R
    b.node.peer_appeared(peer(&r)).await;
    assert_eq!(r.node.stats().received, 1);
}

#[tokio::test]
async fn fragmentation_round_trip() {
    let registry = Registry::default();
    let a = spawn_node(
        &registry,
        "dtn://a/",
        5021,
        Config {
            fragment_max_size: Some(3000),
            ..Config::default()
        },
    )
    .await;
    let b = spawn_node(&registry, "dtn://b/", 5022, Config::default()).await;

    let payload: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
    assert!(
        a.node
            .send(
                b.node.node_id().clone(),
                payload.clone().into_boxed_slice(),
                core::time::Duration::from_secs(3600),
            )
            .await
    );

    // Intake fragmentation left only fragments in the store
    let fragments = a.node.store().get_all();
    assert!(fragments.len() > 1);
    assert!(fragments.iter().all(|f| f.is_fragment()));

    a.node.peer_appeared(peer(&b)).await;

    assert_eq!(b.node.stats().received, fragments.len() as u64);
    assert_eq!(b.node.stats().delivered, 1);
    assert_eq!(*b.delivered.lock().unwrap(), vec![payload]);
    assert_eq!(b.node.fragmentation().stats().reassembled_bundles, 1);
}

#[tokio::test]
async fn spray_and_wait_quota() {
    let registry = Registry::default();
    let spray = Arc::new(SprayAndWait::new(4));

    let mut config = Config::default();
    config.node_id = "dtn://a/".parse().unwrap();
    config.routing = RoutingConfig::SprayAndWait { max_copies: 4 };
    let a = finish_node(&registry, Node::with_strategy(config, spray.clone()), 5031).await;

    let spray_cfg = Config {
        routing: RoutingConfig::SprayAndWait { max_copies: 4 },
        ..Config::default()
    };
    let r1 = spawn_node(&registry, "dtn://r1/", 5032, spray_cfg.clone()).await;
    let r2 = spawn_node(&registry, "dtn://r2/", 5033, spray_cfg.clone()).await;
    let r3 = spawn_node(&registry, "dtn://r3/", 5034, spray_cfg.clone()).await;
    let b = spawn_node(&registry, "dtn://b/", 5035, spray_cfg).await;

    assert!(
        a.node
            .send(
                b.node.node_id().clone(),
                b"sprayed".as_slice(),
                core::time::Duration::from_secs(3600),
            )
            .await
    );
    let id = a.node.store().get_all()[0].id();
    assert_eq!(spray.copy_count(&id), 4);

    // Spray phase: each successful send halves the local remainder
    a.node.peer_appeared(peer(&r1)).await;
    assert_eq!(spray.copy_count(&id), 2);

    a.node.peer_appeared(peer(&r2)).await;
    assert_eq!(spray.copy_count(&id), 1);

    // Wait phase: a further relay gets nothing
    a.node.peer_appeared(peer(&r3)).await;
    assert_eq!(r3.node.stats().received, 0);
    assert_eq!(spray.copy_count(&id), 1);

    // At most max-copies replicas exist in the network
    let replicas = [&a, &r1, &r2, &r3]
        .iter()
        .filter(|n| n.node.store().has(&id))
        .count();
    assert!(replicas <= 4);

    // Direct delivery still happens
    a.node.peer_appeared(peer(&b)).await;
    assert_eq!(b.node.stats().delivered, 1);
}

#[tokio::test]
async fn epidemic_with_no_peers_sends_nothing() {
    let registry = Registry::default();
    let a = spawn_node(&registry, "dtn://a/", 5041, Config::default()).await;

    assert!(
        a.node
            .send(
                "dtn://b/".parse().unwrap(),
                b"nowhere to go".as_slice(),
                core::time::Duration::from_secs(3600),
            )
            .await
    );

    a.node.engine().dispatch().await;
    assert_eq!(a.node.engine().stats().sent, 0);
    assert_eq!(a.node.engine().stats().failed, 0);
}

#[tokio::test]
async fn shutdown_stops_the_node() {
    let registry = Registry::default();
    let a = spawn_node(&registry, "dtn://a/", 5051, Config::default()).await;
    a.node.start();
    a.node.shutdown().await;
    assert!(registry.lock().unwrap().is_empty());
}
