use super::*;
use crate::block::{Block, Data};
use crate::creation_timestamp::CreationTimestamp;
use crate::dtn_time::DtnTime;
use crate::eid::Eid;
use crate::hop_count::HopInfo;
use crate::primary_block::PrimaryBlock;

/// The identity of a bundle: source, creation timestamp, and, for fragments,
/// the fragment offset.
///
/// Two fragments of the same original bundle have distinct ids; a fragment
/// and its original differ by the offset being present.
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Id {
    pub source: Eid,
    pub timestamp: CreationTimestamp,
    pub fragment_offset: Option<u64>,
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.source, self.timestamp)?;
        if let Some(offset) = self.fragment_offset {
            write!(f, ":{offset}")?;
        }
        Ok(())
    }
}

/// An assembled bundle: one primary block plus ordered canonical blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub primary: PrimaryBlock,
    pub blocks: Vec<Block>,
}

impl Bundle {
    pub fn id(&self) -> Id {
        Id {
            source: self.primary.source.clone(),
            timestamp: self.primary.timestamp,
            fragment_offset: self.primary.fragment.map(|f| f.offset),
        }
    }

    pub fn is_fragment(&self) -> bool {
        self.primary.is_fragment()
    }

    pub fn is_admin_record(&self) -> bool {
        self.primary.flags.is_admin_record
    }

    /// The instant at which the bundle ceases to be valid.
    pub fn expiry(&self) -> DtnTime {
        self.primary.expiry()
    }

    pub fn is_expired_at(&self, now: DtnTime) -> bool {
        now > self.expiry()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(DtnTime::now())
    }

    pub fn payload_block(&self) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|b| matches!(b.data, Data::Payload(_)))
    }

    /// The application data carried by the payload block.
    pub fn payload(&self) -> Option<&[u8]> {
        self.blocks.iter().find_map(|b| match &b.data {
            Data::Payload(data) => Some(data.as_ref()),
            _ => None,
        })
    }

    /// The block number an added block would receive: `max(existing) + 1`,
    /// never less than 2 (the payload block is number 1).
    pub fn next_block_number(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| b.number)
            .max()
            .unwrap_or(1)
            .max(1)
            + 1
    }

    /// Append a canonical block, assigning its number. Payload blocks take
    /// number 1 by convention; anything else takes `max(existing) + 1`.
    pub fn add_block(&mut self, flags: block::Flags, crc_type: crc::CrcType, data: Data) -> u64 {
        let number = if matches!(data, Data::Payload(_)) {
            1
        } else {
            self.next_block_number()
        };
        self.blocks.push(Block {
            number,
            flags,
            crc_type,
            data,
        });
        number
    }

    pub fn previous_node(&self) -> Option<&Eid> {
        self.blocks.iter().find_map(|b| match &b.data {
            Data::PreviousNode(eid) => Some(eid),
            _ => None,
        })
    }

    /// Record `node` as the last forwarder, creating the previous-node block
    /// if absent.
    pub fn set_previous_node(&mut self, node: Eid) {
        for b in &mut self.blocks {
            if let Data::PreviousNode(eid) = &mut b.data {
                *eid = node;
                return;
            }
        }
        self.add_block(
            block::Flags::default(),
            crc::CrcType::None,
            Data::PreviousNode(node),
        );
    }

    /// Microseconds since creation, as carried by the bundle-age block.
    pub fn age(&self) -> Option<u64> {
        self.blocks.iter().find_map(|b| match &b.data {
            Data::BundleAge(micros) => Some(*micros),
            _ => None,
        })
    }

    /// Refresh the bundle-age block, if present, to `now - creation time`.
    pub fn refresh_age(&mut self, now: DtnTime) {
        let elapsed = now.duration_since(self.primary.timestamp.time);
        for b in &mut self.blocks {
            if let Data::BundleAge(micros) = &mut b.data {
                *micros = elapsed.as_micros() as u64;
                return;
            }
        }
    }

    pub fn hop_count(&self) -> Option<HopInfo> {
        self.blocks.iter().find_map(|b| match &b.data {
            Data::HopCount(info) => Some(*info),
            _ => None,
        })
    }

    /// Increment the hop-count block, if present, returning the new value.
    pub fn increment_hop_count(&mut self) -> Option<HopInfo> {
        for b in &mut self.blocks {
            if let Data::HopCount(info) = &mut b.data {
                info.increment();
                return Some(*info);
            }
        }
        None
    }

    /// Deterministic serialization of the whole bundle, recomputing every
    /// CRC.
    pub fn to_cbor(&self) -> Vec<u8> {
        let mut e = cbor::encode::Encoder::default();
        e.emit_array(1 + self.blocks.len(), |a| {
            a.emit_raw(&self.primary.to_cbor());
            for block in &self.blocks {
                a.emit_raw(&block.to_cbor());
            }
        });
        e.into_inner()
    }

    /// Parse and validate a bundle from its CBOR serialization.
    ///
    /// All structural invariants are enforced: exactly one payload block
    /// numbered 1, unique positive block numbers, valid CRCs, and fragment
    /// information consistent with the payload size. Trailing data is
    /// rejected.
    pub fn parse(data: &[u8]) -> Result<Bundle, Error> {
        let (bundle, len) = cbor::decode::parse_array(data, |a, _| {
            let primary = PrimaryBlock::parse(data, a)?;

            let mut blocks = Vec::new();
            while let Some(block) = Block::parse(data, a)? {
                blocks.push(block);
            }

            Ok::<_, Error>(Bundle { primary, blocks })
        })?;
        if len != data.len() {
            return Err(Error::AdditionalData);
        }

        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<(), Error> {
        let mut payload_len = None;
        let mut numbers = std::collections::HashSet::new();
        for block in &self.blocks {
            if block.number == 0 {
                return Err(Error::InvalidBlockNumber(0));
            }
            if !numbers.insert(block.number) {
                return Err(Error::DuplicateBlockNumber(block.number));
            }
            if let Data::Payload(data) = &block.data {
                if payload_len.is_some() {
                    return Err(Error::DuplicatePayload);
                }
                if block.number != 1 {
                    return Err(Error::InvalidPayloadBlockNumber);
                }
                payload_len = Some(data.len() as u64);
            }
        }
        let Some(payload_len) = payload_len else {
            return Err(Error::MissingPayload);
        };

        if let Some(fragment) = &self.primary.fragment {
            if fragment.offset.saturating_add(payload_len) > fragment.total_len {
                return Err(Error::InvalidFragmentInfo(
                    fragment.offset,
                    fragment.total_len,
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::crc::CrcType;
    use crate::primary_block::FragmentInfo;

    fn test_bundle(crc_type: CrcType) -> Bundle {
        Builder::new("dtn://a/".parse().unwrap(), "dtn://b/".parse().unwrap())
            .with_crc_type(crc_type)
            .with_lifetime(core::time::Duration::from_secs(3600))
            .with_hop_limit(30)
            .with_payload(b"some application data".as_slice())
            .build(CreationTimestamp::new(DtnTime::new(812070972, 0), 1))
    }

    #[test]
    fn decode_encode_round_trip() {
        for crc_type in [CrcType::None, CrcType::Crc16, CrcType::Crc32] {
            let bundle = test_bundle(crc_type);
            let encoded = bundle.to_cbor();
            let decoded = Bundle::parse(&encoded).unwrap();
            assert_eq!(decoded, bundle);

            // Determinism: same logical bundle, identical bytes
            assert_eq!(decoded.to_cbor(), encoded);
        }
    }

    #[test]
    fn id_survives_the_codec() {
        let bundle = test_bundle(CrcType::Crc32);
        let decoded = Bundle::parse(&bundle.to_cbor()).unwrap();
        assert_eq!(decoded.id(), bundle.id());
    }

    #[test]
    fn fragment_ids_differ_by_offset() {
        let mut a = test_bundle(CrcType::None);
        let mut b = a.clone();
        assert_eq!(a.id(), b.id());

        a.primary.fragment = Some(FragmentInfo {
            offset: 0,
            total_len: 21,
        });
        b.primary.fragment = Some(FragmentInfo {
            offset: 10,
            total_len: 21,
        });
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), test_bundle(CrcType::None).id());
    }

    #[test]
    fn corrupted_payload_fails_crc_check() {
        let bundle = test_bundle(CrcType::Crc16);
        let mut encoded = bundle.to_cbor();
        let idx = encoded.len() - 8;
        encoded[idx] ^= 0xFF;
        assert!(Bundle::parse(&encoded).is_err());
    }

    #[test]
    fn block_number_assignment() {
        let mut bundle = test_bundle(CrcType::None);
        // payload = 1, hop count assigned next
        assert_eq!(bundle.hop_count().unwrap().limit, 30);

        let n = bundle.add_block(
            block::Flags::default(),
            CrcType::None,
            Data::BundleAge(0),
        );
        assert_eq!(n, bundle.blocks.iter().map(|b| b.number).max().unwrap());

        bundle.set_previous_node("dtn://relay/".parse().unwrap());
        assert_eq!(
            bundle.previous_node().unwrap(),
            &"dtn://relay/".parse::<Eid>().unwrap()
        );

        // All numbers unique, payload is 1
        let decoded = Bundle::parse(&bundle.to_cbor()).unwrap();
        assert_eq!(decoded.payload_block().unwrap().number, 1);
    }

    #[test]
    fn previous_node_is_replaced_not_duplicated() {
        let mut bundle = test_bundle(CrcType::None);
        bundle.set_previous_node("dtn://r1/".parse().unwrap());
        bundle.set_previous_node("dtn://r2/".parse().unwrap());
        assert_eq!(
            bundle.previous_node().unwrap().to_string(),
            "dtn://r2/"
        );
        assert_eq!(
            bundle
                .blocks
                .iter()
                .filter(|b| matches!(b.data, Data::PreviousNode(_)))
                .count(),
            1
        );
    }

    #[test]
    fn hop_count_increments() {
        let mut bundle = test_bundle(CrcType::None);
        let info = bundle.increment_hop_count().unwrap();
        assert_eq!(info.count, 1);
        assert!(!info.exceeded());
    }

    #[test]
    fn missing_payload_is_rejected() {
        let mut bundle = test_bundle(CrcType::None);
        bundle.blocks.retain(|b| !matches!(b.data, Data::Payload(_)));
        assert!(matches!(
            Bundle::parse(&bundle.to_cbor()),
            Err(Error::MissingPayload)
        ));
    }

    #[test]
    fn duplicate_block_numbers_are_rejected() {
        let mut bundle = test_bundle(CrcType::None);
        bundle.blocks.push(Block {
            number: 2,
            flags: block::Flags::default(),
            crc_type: CrcType::None,
            data: Data::BundleAge(0),
        });
        bundle.blocks.push(Block {
            number: 2,
            flags: block::Flags::default(),
            crc_type: CrcType::None,
            data: Data::BundleAge(1),
        });
        assert!(matches!(
            Bundle::parse(&bundle.to_cbor()),
            Err(Error::DuplicateBlockNumber(2))
        ));
    }

    #[test]
    fn inconsistent_fragment_info_is_rejected() {
        let mut bundle = test_bundle(CrcType::None);
        let payload_len = bundle.payload().unwrap().len() as u64;
        bundle.primary.fragment = Some(FragmentInfo {
            offset: 10,
            total_len: payload_len, // offset + len overruns the ADU
        });
        assert!(Bundle::parse(&bundle.to_cbor()).is_err());
    }

    #[test]
    fn trailing_data_is_rejected() {
        let mut encoded = test_bundle(CrcType::None).to_cbor();
        encoded.push(0x00);
        assert!(matches!(
            Bundle::parse(&encoded),
            Err(Error::AdditionalData)
        ));
    }
}
