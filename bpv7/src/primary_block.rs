use super::*;
use crate::crc::CrcType;
use crate::creation_timestamp::CreationTimestamp;
use crate::eid::Eid;
use crate::error::CaptureFieldErr;

/// Bundle processing control flags carried by the primary block.
///
/// The is-fragment bit is not represented here; it is derived from the
/// presence of [`PrimaryBlock::fragment`].
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Flags {
    pub is_admin_record: bool,
    pub do_not_fragment: bool,
    pub receipt_report_requested: bool,
    pub forward_report_requested: bool,
    pub delivery_report_requested: bool,
    pub delete_report_requested: bool,
    pub unrecognised: u64,
}

const FRAGMENT_BIT: u64 = 1 << 0;
const KNOWN_BITS: u64 =
    FRAGMENT_BIT | (1 << 1) | (1 << 2) | (1 << 14) | (1 << 16) | (1 << 17) | (1 << 18);

impl Flags {
    fn from_wire(value: u64) -> (Self, bool) {
        let flags = Self {
            is_admin_record: value & (1 << 1) != 0,
            do_not_fragment: value & (1 << 2) != 0,
            receipt_report_requested: value & (1 << 14) != 0,
            forward_report_requested: value & (1 << 16) != 0,
            delivery_report_requested: value & (1 << 17) != 0,
            delete_report_requested: value & (1 << 18) != 0,
            unrecognised: value & !KNOWN_BITS,
        };
        (flags, value & FRAGMENT_BIT != 0)
    }

    fn to_wire(self, is_fragment: bool) -> u64 {
        let mut value = self.unrecognised;
        if is_fragment {
            value |= FRAGMENT_BIT;
        }
        if self.is_admin_record {
            value |= 1 << 1;
        }
        if self.do_not_fragment {
            value |= 1 << 2;
        }
        if self.receipt_report_requested {
            value |= 1 << 14;
        }
        if self.forward_report_requested {
            value |= 1 << 16;
        }
        if self.delivery_report_requested {
            value |= 1 << 17;
        }
        if self.delete_report_requested {
            value |= 1 << 18;
        }
        value
    }
}

/// Fragment placement of this bundle's payload within the original ADU.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FragmentInfo {
    pub offset: u64,
    pub total_len: u64,
}

/// The mandatory first block of every bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryBlock {
    pub flags: Flags,
    pub crc_type: CrcType,
    pub destination: Eid,
    pub source: Eid,
    pub report_to: Eid,
    pub timestamp: CreationTimestamp,
    pub lifetime: core::time::Duration,
    pub fragment: Option<FragmentInfo>,
}

pub const VERSION: u64 = 7;

impl PrimaryBlock {
    pub fn is_fragment(&self) -> bool {
        self.fragment.is_some()
    }

    /// The instant at which the bundle ceases to be valid.
    pub fn expiry(&self) -> dtn_time::DtnTime {
        self.timestamp.time.saturating_add(self.lifetime)
    }

    /// Encode as a standalone CBOR array, CRC included.
    pub fn to_cbor(&self) -> Vec<u8> {
        let mut count = 8;
        if self.fragment.is_some() {
            count += 2;
        }
        if !matches!(self.crc_type, CrcType::None) {
            count += 1;
        }
        crc::append_crc_value(
            self.crc_type,
            cbor::encode::emit_array(count, |a| {
                a.emit(&VERSION);
                a.emit(&self.flags.to_wire(self.is_fragment()));
                a.emit(&self.crc_type);
                a.emit(&self.destination.to_string());
                a.emit(&self.source.to_string());
                a.emit(&self.report_to.to_string());
                a.emit(&self.timestamp);
                a.emit(&(self.lifetime.as_millis() as u64));
                if let Some(fragment) = &self.fragment {
                    a.emit(&fragment.offset);
                    a.emit(&fragment.total_len);
                }
                if !matches!(self.crc_type, CrcType::None) {
                    a.skip_value();
                }
            }),
        )
    }

    /// Parse the next item of `array` as a primary block, verifying its CRC.
    /// `data` must be the buffer `array` is iterating over.
    pub(crate) fn parse(
        data: &[u8],
        array: &mut cbor::decode::Array,
    ) -> Result<PrimaryBlock, Error> {
        array.parse_array(|block, block_start, _| {
            let version: u64 = block.parse().map_field_err("version")?;
            if version != VERSION {
                return Err(Error::InvalidVersion(version));
            }

            let (flags, is_fragment) =
                Flags::from_wire(block.parse().map_field_err("bundle processing control flags")?);

            let crc_type: CrcType = block.parse().map_field_err("CRC type")?;

            let destination = parse_eid(block).map_field_err("destination EID")?;
            let source = parse_eid(block).map_field_err("source EID")?;
            let report_to = parse_eid(block).map_field_err("report-to EID")?;

            let timestamp: CreationTimestamp =
                block.parse().map_field_err("creation timestamp")?;

            let lifetime = core::time::Duration::from_millis(
                block.parse().map_field_err("lifetime")?,
            );

            let fragment = if is_fragment {
                let offset: u64 = block.parse().map_field_err("fragment offset")?;
                let total_len: u64 = block
                    .parse()
                    .map_field_err("total application data unit length")?;
                if offset >= total_len {
                    return Err(Error::InvalidFragmentInfo(offset, total_len));
                }
                Some(FragmentInfo { offset, total_len })
            } else {
                None
            };

            crc::parse_crc_value(data, block_start, block, crc_type)?;

            Ok(PrimaryBlock {
                flags,
                crc_type,
                destination,
                source,
                report_to,
                timestamp,
                lifetime,
                fragment,
            })
        })
    }
}

fn parse_eid(block: &mut cbor::decode::Array) -> Result<Eid, Error> {
    // Primary block fields carry the flat URI text form
    block
        .parse::<String>()
        .map_err(Error::from)?
        .parse()
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtn_time::DtnTime;

    fn test_block(crc_type: CrcType, fragment: Option<FragmentInfo>) -> PrimaryBlock {
        PrimaryBlock {
            flags: Flags {
                delivery_report_requested: true,
                ..Default::default()
            },
            crc_type,
            destination: "dtn://b/".parse().unwrap(),
            source: "dtn://a/".parse().unwrap(),
            report_to: Eid::Null,
            timestamp: CreationTimestamp::new(DtnTime::new(812070972, 0), 3),
            lifetime: core::time::Duration::from_secs(3600),
            fragment,
        }
    }

    fn round_trip(block: PrimaryBlock) {
        let outer = {
            let mut e = cbor::encode::Encoder::default();
            e.emit_array(1, |a| a.emit_raw(&block.to_cbor()));
            e.into_inner()
        };
        let parsed = cbor::decode::parse_array(&outer, |a, _| {
            let b = PrimaryBlock::parse(&outer, a)?;
            a.end()?;
            Ok::<_, Error>(b)
        })
        .map(|(b, _)| b)
        .unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn round_trips() {
        round_trip(test_block(CrcType::None, None));
        round_trip(test_block(CrcType::Crc16, None));
        round_trip(test_block(CrcType::Crc32, None));
        round_trip(test_block(
            CrcType::Crc16,
            Some(FragmentInfo {
                offset: 1000,
                total_len: 10000,
            }),
        ));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut block = test_block(CrcType::None, None).to_cbor();
        // version is the second byte of the encoding
        block[1] = 6;
        let outer = {
            let mut e = cbor::encode::Encoder::default();
            e.emit_array(1, |a| a.emit_raw(&block));
            e.into_inner()
        };
        let r = cbor::decode::parse_array(&outer, |a, _| PrimaryBlock::parse(&outer, a));
        assert!(matches!(r, Err(Error::InvalidVersion(6))));
    }

    #[test]
    fn expiry_is_creation_plus_lifetime() {
        let block = test_block(CrcType::None, None);
        assert_eq!(block.expiry(), DtnTime::new(812070972 + 3600, 0));
    }
}
