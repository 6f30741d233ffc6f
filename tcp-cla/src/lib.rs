/*!
A TCP convergence layer.

Each transmission is a 4-byte big-endian length prefix followed by the CBOR
bundle bytes; the receiver reads exactly that many bytes and hands them to
the node. Outbound connections are either ephemeral (closed after each send)
or permanent (kept for reuse and dropped when idle), selected by
[`Config::permanent_connections`].
*/

use async_trait::async_trait;
use bytes::Bytes;
use sojourn_bpa::cla::{Cla, ClaAddress, Result, SendResult, Sink};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone)]
pub struct Config {
    /// Listener bind address.
    pub address: std::net::IpAddr,
    /// Listener bind port; 0 selects an ephemeral port.
    pub port: u16,
    /// Keep outbound connections open for reuse instead of closing after
    /// each send.
    pub permanent_connections: bool,
    /// Idle period after which a permanent connection is dropped.
    pub idle_timeout: core::time::Duration,
    /// Inbound frames larger than this are treated as garbage and the
    /// connection is closed.
    pub max_bundle_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: std::net::Ipv4Addr::UNSPECIFIED.into(),
            port: 4556,
            permanent_connections: false,
            idle_timeout: core::time::Duration::from_secs(60),
            max_bundle_size: 10 * 1024 * 1024,
        }
    }
}

struct Connection {
    stream: TcpStream,
    last_used: tokio::time::Instant,
}

/// Counters exposed for observability.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TcpClaStats {
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
}

pub struct TcpCla {
    config: Config,
    cancel_token: tokio_util::sync::CancellationToken,
    task_tracker: tokio_util::task::TaskTracker,
    local_addr: Mutex<Option<SocketAddr>>,
    connections: Arc<tokio::sync::Mutex<HashMap<SocketAddr, Connection>>>,
    sent: AtomicU64,
    received: Arc<AtomicU64>,
    failed: AtomicU64,
}

impl TcpCla {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            cancel_token: tokio_util::sync::CancellationToken::new(),
            task_tracker: tokio_util::task::TaskTracker::new(),
            local_addr: Mutex::new(None),
            connections: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            sent: AtomicU64::new(0),
            received: Arc::new(AtomicU64::new(0)),
            failed: AtomicU64::new(0),
        })
    }

    pub fn stats(&self) -> TcpClaStats {
        TcpClaStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Addresses of the currently open permanent connections.
    pub async fn active_connections(&self) -> Vec<SocketAddr> {
        self.connections.lock().await.keys().copied().collect()
    }

    async fn accept_loop(
        listener: TcpListener,
        sink: Arc<dyn Sink>,
        cancel_token: tokio_util::sync::CancellationToken,
        task_tracker: tokio_util::task::TaskTracker,
        received: Arc<AtomicU64>,
        max_bundle_size: u32,
    ) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                r = listener.accept() => match r {
                    Ok((stream, remote)) => {
                        trace!("accepted connection from {remote}");
                        let sink = sink.clone();
                        let cancel_token = cancel_token.clone();
                        let received = received.clone();
                        task_tracker.spawn(async move {
                            Self::read_loop(
                                stream,
                                remote,
                                sink,
                                cancel_token,
                                received,
                                max_bundle_size,
                            )
                            .await
                        });
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        break;
                    }
                }
            }
        }
    }

    /// Read length-prefixed bundles off one inbound connection until it
    /// closes or produces garbage.
    async fn read_loop(
        mut stream: TcpStream,
        remote: SocketAddr,
        sink: Arc<dyn Sink>,
        cancel_token: tokio_util::sync::CancellationToken,
        received: Arc<AtomicU64>,
        max_bundle_size: u32,
    ) {
        loop {
            let mut len_bytes = [0u8; 4];
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                r = stream.read_exact(&mut len_bytes) => {
                    if r.is_err() {
                        // Orderly close or reset; either way the stream is done
                        break;
                    }
                }
            }

            let len = u32::from_be_bytes(len_bytes);
            if len == 0 || len > max_bundle_size {
                debug!("invalid frame length {len} from {remote}, closing");
                break;
            }

            let mut data = vec![0u8; len as usize];
            if let Err(e) = stream.read_exact(&mut data).await {
                debug!("short read from {remote}: {e}");
                break;
            }

            received.fetch_add(1, Ordering::Relaxed);
            sink.dispatch(Bytes::from(data), ClaAddress::Tcp(remote)).await;
        }
    }

    async fn write_frame(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
        stream.write_all(&(data.len() as u32).to_be_bytes()).await?;
        stream.write_all(data).await?;
        stream.flush().await
    }

    async fn send_permanent(&self, data: &[u8], remote: SocketAddr) -> Result<SendResult> {
        let mut connections = self.connections.lock().await;

        if !connections.contains_key(&remote) {
            match TcpStream::connect(remote).await {
                Ok(stream) => {
                    connections.insert(
                        remote,
                        Connection {
                            stream,
                            last_used: tokio::time::Instant::now(),
                        },
                    );
                }
                Err(e) => {
                    debug!("connect to {remote} failed: {e}");
                    return Ok(SendResult::Unreachable);
                }
            }
        }

        let connection = connections.get_mut(&remote).expect("connection just inserted");
        match Self::write_frame(&mut connection.stream, data).await {
            Ok(()) => {
                connection.last_used = tokio::time::Instant::now();
                Ok(SendResult::Sent)
            }
            Err(e) => {
                // A stale connection; drop it so the next attempt redials
                connections.remove(&remote);
                Err(e.into())
            }
        }
    }

    async fn send_ephemeral(&self, data: &[u8], remote: SocketAddr) -> Result<SendResult> {
        let mut stream = match TcpStream::connect(remote).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("connect to {remote} failed: {e}");
                return Ok(SendResult::Unreachable);
            }
        };
        Self::write_frame(&mut stream, data).await?;
        stream.shutdown().await.ok();
        Ok(SendResult::Sent)
    }
}

#[async_trait]
impl Cla for TcpCla {
    async fn on_register(
        &self,
        sink: Arc<dyn Sink>,
        _node_id: &sojourn_bpv7::eid::Eid,
    ) -> Result<()> {
        let listener =
            TcpListener::bind(SocketAddr::new(self.config.address, self.config.port)).await?;
        let local = listener.local_addr()?;
        *self.local_addr.lock().expect("local addr lock") = Some(local);
        info!("TCP convergence layer listening on {local}");

        self.task_tracker.spawn(Self::accept_loop(
            listener,
            sink,
            self.cancel_token.clone(),
            self.task_tracker.clone(),
            self.received.clone(),
            self.config.max_bundle_size,
        ));

        if self.config.permanent_connections {
            let connections = self.connections.clone();
            let idle_timeout = self.config.idle_timeout;
            let cancel_token = self.cancel_token.clone();
            self.task_tracker.spawn(async move {
                let mut interval = tokio::time::interval(idle_timeout);
                loop {
                    tokio::select! {
                        _ = cancel_token.cancelled() => break,
                        _ = interval.tick() => {
                            let now = tokio::time::Instant::now();
                            connections.lock().await.retain(|remote, c| {
                                let keep = now.duration_since(c.last_used) < idle_timeout;
                                if !keep {
                                    trace!("dropping idle connection to {remote}");
                                }
                                keep
                            });
                        }
                    }
                }
            });
        }
        Ok(())
    }

    async fn on_unregister(&self) {
        self.cancel_token.cancel();
        self.connections.lock().await.clear();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }

    async fn send(&self, data: Bytes, addr: &ClaAddress) -> Result<SendResult> {
        let ClaAddress::Tcp(remote) = addr else {
            return Ok(SendResult::Unreachable);
        };

        let r = if self.config.permanent_connections {
            self.send_permanent(&data, *remote).await
        } else {
            self.send_ephemeral(&data, *remote).await
        };
        match &r {
            Ok(SendResult::Sent) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                trace!("sent {} bytes to {remote}", data.len());
            }
            _ => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        r
    }

    async fn is_reachable(&self, addr: &ClaAddress) -> bool {
        let ClaAddress::Tcp(remote) = addr else {
            return false;
        };

        if self.config.permanent_connections
            && self.connections.lock().await.contains_key(remote)
        {
            return true;
        }

        // Probe with a short-lived connection
        match tokio::time::timeout(
            core::time::Duration::from_secs(5),
            TcpStream::connect(remote),
        )
        .await
        {
            Ok(Ok(stream)) => {
                if self.config.permanent_connections {
                    self.connections.lock().await.insert(
                        *remote,
                        Connection {
                            stream,
                            last_used: tokio::time::Instant::now(),
                        },
                    );
                }
                true
            }
            _ => false,
        }
    }

    async fn address(&self) -> Option<ClaAddress> {
        self.local_addr
            .lock()
            .expect("local addr lock")
            .map(ClaAddress::Tcp)
    }
}
