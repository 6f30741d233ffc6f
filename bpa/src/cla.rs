use super::*;
use async_trait::async_trait;
use thiserror::Error;

/// A specialized `Result` type for CLA operations.
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("the CLA is already registered")]
    AlreadyRegistered,

    #[error("the CLA is not registered")]
    NotRegistered,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A transport endpoint address a convergence layer can deliver to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClaAddress {
    Tcp(std::net::SocketAddr),
    Udp(std::net::SocketAddr),
}

impl std::fmt::Display for ClaAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaAddress::Tcp(addr) => write!(f, "tcp:{addr}"),
            ClaAddress::Udp(addr) => write!(f, "udp:{addr}"),
        }
    }
}

/// The outcome of a transmission attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SendResult {
    /// The bundle was handed to the transport in full.
    Sent,
    /// The endpoint could not be reached; the caller may retry later.
    Unreachable,
}

/// A convergence layer adapter.
///
/// A CLA adapts the bundle protocol to one underlying transport. It is handed
/// a [`Sink`] at registration, through which it dispatches inbound bundles
/// and peer liveness changes; it never holds a direct reference to the node.
#[async_trait]
pub trait Cla: Send + Sync {
    /// Called when the CLA is registered with a node. The CLA should bind
    /// its transport and start any listener tasks.
    async fn on_register(&self, sink: Arc<dyn Sink>, node_id: &bpv7::eid::Eid) -> Result<()>;

    /// Called when the node shuts down. The CLA should stop its tasks and
    /// close every connection; in-flight sends may complete or fail.
    async fn on_unregister(&self);

    /// Transmit one encoded bundle to `addr`.
    ///
    /// Within a single peer, successive calls are delivered in order.
    async fn send(&self, data: Bytes, addr: &ClaAddress) -> Result<SendResult>;

    /// Whether `addr` is believed deliverable. This is a hint only;
    /// [`send`](Cla::send) may still fail.
    async fn is_reachable(&self, addr: &ClaAddress) -> bool;

    /// The CLA's own endpoint address, once its transport is bound.
    async fn address(&self) -> Option<ClaAddress>;
}

/// The channel from a CLA back to the node that registered it.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Hand a successfully received bundle image to the node.
    async fn dispatch(&self, data: Bytes, from: ClaAddress);

    /// Report that a peer node has become reachable at `addr`.
    async fn add_peer(&self, eid: bpv7::eid::Eid, addr: ClaAddress);

    /// Report that a peer node is no longer reachable.
    async fn remove_peer(&self, eid: &bpv7::eid::Eid);
}
