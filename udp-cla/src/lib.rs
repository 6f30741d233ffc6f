/*!
A UDP convergence layer.

Bundles whose encoded form fits a single datagram are sent as a `0xBB`
marker byte followed by the CBOR bytes. Larger bundles are split across
datagrams, each carrying an 8-byte header:

```text
| 0x1B | bundle-id (4, BE) | fragment-index (2, BE) | fragment-count (1) |
```

The bundle id is a node-local counter identifying a datagram train on this
link only; it is unrelated to the BP bundle id and never reaches routing.
Receive-side reassembly is keyed by source address and bundle id, and
incomplete trains are discarded after 60 seconds.
*/

use async_trait::async_trait;
use bytes::Bytes;
use sojourn_bpa::cla::{Cla, ClaAddress, Error, Result, SendResult, Sink};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

/// The largest UDP payload deliverable over IPv4.
const MAX_DATAGRAM: usize = 65507;

const WHOLE_BUNDLE_MARKER: u8 = 0xBB;
const FRAGMENT_MARKER: u8 = 0x1B;
const FRAGMENT_HEADER_LEN: usize = 8;
const MAX_FRAGMENT_PAYLOAD: usize = MAX_DATAGRAM - FRAGMENT_HEADER_LEN;

/// Incomplete reassembly state is discarded after this long.
const PENDING_TIMEOUT: core::time::Duration = core::time::Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    /// Socket bind address.
    pub address: std::net::IpAddr,
    /// Socket bind port; 0 selects an ephemeral port.
    pub port: u16,
    /// Period between sweeps of stale reassembly state.
    pub cleanup_interval: core::time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: std::net::Ipv4Addr::UNSPECIFIED.into(),
            port: 4557,
            cleanup_interval: core::time::Duration::from_secs(60),
        }
    }
}

struct PendingBundle {
    fragments: Vec<Option<Vec<u8>>>,
    received: usize,
    expires: tokio::time::Instant,
}

/// Counters exposed for observability.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct UdpClaStats {
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
    pub dropped_datagrams: u64,
    pub expired_pending: u64,
}

pub struct UdpCla {
    config: Config,
    cancel_token: tokio_util::sync::CancellationToken,
    task_tracker: tokio_util::task::TaskTracker,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    pending: Arc<Mutex<HashMap<(SocketAddr, u32), PendingBundle>>>,
    next_bundle_id: AtomicU32,
    sent: AtomicU64,
    received: Arc<AtomicU64>,
    failed: AtomicU64,
    dropped: Arc<AtomicU64>,
    expired: Arc<AtomicU64>,
}

impl UdpCla {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            cancel_token: tokio_util::sync::CancellationToken::new(),
            task_tracker: tokio_util::task::TaskTracker::new(),
            socket: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_bundle_id: AtomicU32::new(1),
            sent: AtomicU64::new(0),
            received: Arc::new(AtomicU64::new(0)),
            failed: AtomicU64::new(0),
            dropped: Arc::new(AtomicU64::new(0)),
            expired: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn stats(&self) -> UdpClaStats {
        UdpClaStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped_datagrams: self.dropped.load(Ordering::Relaxed),
            expired_pending: self.expired.load(Ordering::Relaxed),
        }
    }

    async fn recv_loop(
        socket: Arc<UdpSocket>,
        sink: Arc<dyn Sink>,
        cancel_token: tokio_util::sync::CancellationToken,
        pending: Arc<Mutex<HashMap<(SocketAddr, u32), PendingBundle>>>,
        received: Arc<AtomicU64>,
        dropped: Arc<AtomicU64>,
    ) {
        let mut buf = vec![0u8; 65535];
        loop {
            let (len, from) = tokio::select! {
                _ = cancel_token.cancelled() => break,
                r = socket.recv_from(&mut buf) => match r {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("recv failed: {e}");
                        break;
                    }
                }
            };

            match Self::handle_datagram(&buf[..len], from, &pending) {
                Datagram::Bundle(data) => {
                    received.fetch_add(1, Ordering::Relaxed);
                    sink.dispatch(data, ClaAddress::Udp(from)).await;
                }
                Datagram::Partial => {}
                Datagram::Dropped => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Classify one datagram, accumulating fragment trains as needed.
    fn handle_datagram(
        data: &[u8],
        from: SocketAddr,
        pending: &Mutex<HashMap<(SocketAddr, u32), PendingBundle>>,
    ) -> Datagram {
        match data.first() {
            Some(&WHOLE_BUNDLE_MARKER) => {
                trace!("whole bundle ({} bytes) from {from}", data.len() - 1);
                Datagram::Bundle(Bytes::copy_from_slice(&data[1..]))
            }
            Some(&FRAGMENT_MARKER) if data.len() > FRAGMENT_HEADER_LEN => {
                let bundle_id = u32::from_be_bytes(data[1..5].try_into().unwrap());
                let index = u16::from_be_bytes(data[5..7].try_into().unwrap()) as usize;
                let count = data[7] as usize;
                let payload = &data[FRAGMENT_HEADER_LEN..];

                let mut pending = pending.lock().expect("pending bundles lock");
                let entry = pending
                    .entry((from, bundle_id))
                    .or_insert_with(|| PendingBundle {
                        fragments: vec![None; count],
                        received: 0,
                        expires: tokio::time::Instant::now() + PENDING_TIMEOUT,
                    });

                if count == 0 || count != entry.fragments.len() || index >= count {
                    debug!(
                        "inconsistent fragment header from {from}: index {index} of {count}"
                    );
                    pending.remove(&(from, bundle_id));
                    return Datagram::Dropped;
                }
                if entry.fragments[index].is_some() {
                    debug!("duplicate datagram fragment {index} from {from}");
                    return Datagram::Dropped;
                }

                entry.fragments[index] = Some(payload.to_vec());
                entry.received += 1;
                trace!(
                    "datagram fragment {index}/{count} of train {bundle_id} from {from}"
                );

                if entry.received == count {
                    let entry = pending
                        .remove(&(from, bundle_id))
                        .expect("pending entry just updated");
                    let mut data = Vec::new();
                    for fragment in entry.fragments {
                        data.extend(fragment.expect("all fragments received"));
                    }
                    Datagram::Bundle(Bytes::from(data))
                } else {
                    Datagram::Partial
                }
            }
            Some(marker) => {
                debug!("unknown datagram marker {marker:#04x} from {from}");
                Datagram::Dropped
            }
            None => Datagram::Dropped,
        }
    }

    fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.lock().expect("socket lock").clone()
    }
}

enum Datagram {
    Bundle(Bytes),
    Partial,
    Dropped,
}

#[async_trait]
impl Cla for UdpCla {
    async fn on_register(
        &self,
        sink: Arc<dyn Sink>,
        _node_id: &sojourn_bpv7::eid::Eid,
    ) -> Result<()> {
        let socket = Arc::new(
            UdpSocket::bind(SocketAddr::new(self.config.address, self.config.port)).await?,
        );
        info!(
            "UDP convergence layer bound to {}",
            socket.local_addr()?
        );
        *self.socket.lock().expect("socket lock") = Some(socket.clone());

        self.task_tracker.spawn(Self::recv_loop(
            socket,
            sink,
            self.cancel_token.clone(),
            self.pending.clone(),
            self.received.clone(),
            self.dropped.clone(),
        ));

        let pending = self.pending.clone();
        let expired = self.expired.clone();
        let cancel_token = self.cancel_token.clone();
        let cleanup_interval = self.config.cleanup_interval;
        self.task_tracker.spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = interval.tick() => {
                        let now = tokio::time::Instant::now();
                        let mut pending = pending.lock().expect("pending bundles lock");
                        let before = pending.len();
                        pending.retain(|_, p| p.expires > now);
                        let removed = before - pending.len();
                        drop(pending);
                        if removed > 0 {
                            debug!("discarded {removed} stale datagram trains");
                            expired.fetch_add(removed as u64, Ordering::Relaxed);
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn on_unregister(&self) {
        self.cancel_token.cancel();
        *self.socket.lock().expect("socket lock") = None;
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }

    async fn send(&self, data: Bytes, addr: &ClaAddress) -> Result<SendResult> {
        let ClaAddress::Udp(remote) = addr else {
            return Ok(SendResult::Unreachable);
        };
        let Some(socket) = self.socket() else {
            return Ok(SendResult::Unreachable);
        };

        let r = async {
            if data.len() + 1 <= MAX_DATAGRAM {
                let mut datagram = Vec::with_capacity(data.len() + 1);
                datagram.push(WHOLE_BUNDLE_MARKER);
                datagram.extend_from_slice(&data);
                socket.send_to(&datagram, *remote).await?;
                return Ok(SendResult::Sent);
            }

            let count = data.len().div_ceil(MAX_FRAGMENT_PAYLOAD);
            if count > u8::MAX as usize {
                return Err(Error::Internal(
                    format!("{} byte bundle exceeds the UDP fragment train limit", data.len())
                        .into(),
                ));
            }

            let bundle_id = self.next_bundle_id.fetch_add(1, Ordering::Relaxed);
            trace!(
                "splitting {} bytes into {count} datagrams as train {bundle_id}",
                data.len()
            );
            for (index, chunk) in data.chunks(MAX_FRAGMENT_PAYLOAD).enumerate() {
                let mut datagram = Vec::with_capacity(FRAGMENT_HEADER_LEN + chunk.len());
                datagram.push(FRAGMENT_MARKER);
                datagram.extend_from_slice(&bundle_id.to_be_bytes());
                datagram.extend_from_slice(&(index as u16).to_be_bytes());
                datagram.push(count as u8);
                datagram.extend_from_slice(chunk);
                socket.send_to(&datagram, *remote).await?;
            }
            Ok(SendResult::Sent)
        }
        .await;

        match &r {
            Ok(SendResult::Sent) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        r
    }

    async fn is_reachable(&self, addr: &ClaAddress) -> bool {
        // UDP offers no liveness signal; any address of our family might be
        // deliverable
        matches!(addr, ClaAddress::Udp(_))
    }

    async fn address(&self) -> Option<ClaAddress> {
        self.socket()
            .and_then(|s| s.local_addr().ok())
            .map(ClaAddress::Udp)
    }
}
