use super::*;
use crate::bpv7::{crc::CrcType, eid::Eid};

/// Node configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// The EID of this node.
    #[cfg_attr(feature = "serde", serde(with = "eid_str"))]
    pub node_id: Eid,

    /// Push is rejected once the store holds this many bundles.
    pub store_max_bundles: usize,

    /// Period between expiry sweeps of the store, the fragment sets and the
    /// routing descriptors.
    pub cleanup_interval: core::time::Duration,

    /// Period between routing dispatch passes.
    pub routing_interval: core::time::Duration,

    /// Bundles whose encoded form exceeds this are fragmented at intake.
    /// `None` disables intake fragmentation.
    pub fragment_max_size: Option<usize>,

    /// CRC type applied to locally sourced bundles.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub crc_type: CrcType,

    /// Whether to emit status reports for remote bundles.
    pub status_reports: bool,

    /// The routing strategy to run.
    pub routing: RoutingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: Eid::Null,
            store_max_bundles: 1000,
            cleanup_interval: core::time::Duration::from_secs(60),
            routing_interval: core::time::Duration::from_secs(10),
            fragment_max_size: None,
            crc_type: CrcType::None,
            status_reports: false,
            routing: RoutingConfig::default(),
        }
    }
}

/// Which forwarding strategy the routing engine runs.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RoutingConfig {
    /// Flood to every eligible peer.
    Epidemic,
    /// Quota-limited flooding.
    SprayAndWait { max_copies: u32 },
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig::Epidemic
    }
}

#[cfg(feature = "serde")]
mod eid_str {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(eid: &Eid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(eid)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Eid, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}
