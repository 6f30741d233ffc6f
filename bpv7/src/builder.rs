use super::*;
use crate::block::Data;
use crate::bundle::Bundle;
use crate::creation_timestamp::CreationTimestamp;
use crate::eid::Eid;
use crate::hop_count::HopInfo;
use crate::primary_block::PrimaryBlock;

/// A fluent builder for new bundles.
///
/// Extension blocks are emitted before the payload block, which always comes
/// last and takes block number 1.
pub struct Builder {
    source: Eid,
    destination: Eid,
    report_to: Eid,
    flags: primary_block::Flags,
    crc_type: crc::CrcType,
    lifetime: core::time::Duration,
    hop_limit: Option<u64>,
    with_age: bool,
    payload: Box<[u8]>,
    extensions: Vec<(block::Flags, crc::CrcType, Data)>,
}

impl Builder {
    pub fn new(source: Eid, destination: Eid) -> Self {
        Self {
            source,
            destination,
            report_to: Eid::Null,
            flags: primary_block::Flags::default(),
            crc_type: crc::CrcType::None,
            lifetime: core::time::Duration::from_secs(3600),
            hop_limit: None,
            with_age: false,
            payload: Box::default(),
            extensions: Vec::new(),
        }
    }

    pub fn with_report_to(mut self, report_to: Eid) -> Self {
        self.report_to = report_to;
        self
    }

    pub fn with_flags(mut self, flags: primary_block::Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_crc_type(mut self, crc_type: crc::CrcType) -> Self {
        self.crc_type = crc_type;
        self
    }

    pub fn with_lifetime(mut self, lifetime: core::time::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn must_not_fragment(mut self) -> Self {
        self.flags.do_not_fragment = true;
        self
    }

    pub fn is_admin_record(mut self) -> Self {
        self.flags.is_admin_record = true;
        self
    }

    pub fn with_delivery_report(mut self) -> Self {
        self.flags.delivery_report_requested = true;
        self
    }

    /// Add a hop-count block with the given limit and a zero count.
    pub fn with_hop_limit(mut self, limit: u64) -> Self {
        self.hop_limit = Some(limit);
        self
    }

    /// Add a bundle-age block starting at zero.
    pub fn with_age_block(mut self) -> Self {
        self.with_age = true;
        self
    }

    /// Add an arbitrary extension block.
    pub fn add_block(mut self, flags: block::Flags, crc_type: crc::CrcType, data: Data) -> Self {
        self.extensions.push((flags, crc_type, data));
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Box<[u8]>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn build(self, timestamp: CreationTimestamp) -> Bundle {
        let mut bundle = Bundle {
            primary: PrimaryBlock {
                flags: self.flags,
                crc_type: self.crc_type,
                destination: self.destination,
                source: self.source,
                report_to: self.report_to,
                timestamp,
                lifetime: self.lifetime,
                fragment: None,
            },
            blocks: Vec::new(),
        };

        if let Some(limit) = self.hop_limit {
            bundle.add_block(
                block::Flags::default(),
                self.crc_type,
                Data::HopCount(HopInfo::new(limit)),
            );
        }
        if self.with_age {
            bundle.add_block(block::Flags::default(), self.crc_type, Data::BundleAge(0));
        }
        for (flags, crc_type, data) in self.extensions {
            bundle.add_block(flags, crc_type, data);
        }
        bundle.add_block(
            block::Flags::default(),
            self.crc_type,
            Data::Payload(self.payload),
        );
        bundle
    }
}
