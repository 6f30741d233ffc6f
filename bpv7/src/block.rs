use super::*;
use crate::crc::CrcType;
use crate::eid::Eid;
use crate::error::CaptureFieldErr;
use crate::hop_count::HopInfo;

/// Canonical block type codes this stack understands.
///
/// Unrecognised codes are preserved so that unknown blocks can be forwarded
/// intact.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Payload,
    PreviousNode,
    BundleAge,
    HopCount,
    Unrecognised(u64),
}

impl From<Type> for u64 {
    fn from(value: Type) -> Self {
        match value {
            Type::Payload => 1,
            Type::PreviousNode => 6,
            Type::BundleAge => 7,
            Type::HopCount => 10,
            Type::Unrecognised(v) => v,
        }
    }
}

impl From<u64> for Type {
    fn from(value: u64) -> Self {
        match value {
            1 => Type::Payload,
            6 => Type::PreviousNode,
            7 => Type::BundleAge,
            10 => Type::HopCount,
            value => Type::Unrecognised(value),
        }
    }
}

/// Block processing control flags.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Flags {
    pub must_replicate: bool,
    pub report_on_failure: bool,
    pub delete_bundle_on_failure: bool,
    pub remove_block_on_failure: bool,
    pub status_report_requested: bool,
    pub unrecognised: u64,
}

impl From<u64> for Flags {
    fn from(value: u64) -> Self {
        let mut flags = Self {
            unrecognised: value & !0b11111,
            ..Default::default()
        };
        if value & (1 << 0) != 0 {
            flags.must_replicate = true;
        }
        if value & (1 << 1) != 0 {
            flags.report_on_failure = true;
        }
        if value & (1 << 2) != 0 {
            flags.delete_bundle_on_failure = true;
        }
        if value & (1 << 3) != 0 {
            flags.remove_block_on_failure = true;
        }
        if value & (1 << 4) != 0 {
            flags.status_report_requested = true;
        }
        flags
    }
}

impl From<Flags> for u64 {
    fn from(value: Flags) -> Self {
        let mut flags = value.unrecognised;
        if value.must_replicate {
            flags |= 1 << 0;
        }
        if value.report_on_failure {
            flags |= 1 << 1;
        }
        if value.delete_bundle_on_failure {
            flags |= 1 << 2;
        }
        if value.remove_block_on_failure {
            flags |= 1 << 3;
        }
        if value.status_report_requested {
            flags |= 1 << 4;
        }
        flags
    }
}

/// The typed body of a canonical block.
///
/// Block-type-specific data lives behind a variant, so that callers get a
/// parsed view for the types the stack knows about while anything else
/// round-trips as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    /// Opaque application bytes.
    Payload(Box<[u8]>),
    /// The node that last forwarded this bundle.
    PreviousNode(Eid),
    /// Microseconds elapsed since bundle creation.
    BundleAge(u64),
    /// Forwarding limit and count.
    HopCount(HopInfo),
    /// Raw data bytes of a block type this stack does not interpret.
    Unrecognised { type_code: u64, data: Box<[u8]> },
}

impl Data {
    pub fn block_type(&self) -> Type {
        match self {
            Data::Payload(_) => Type::Payload,
            Data::PreviousNode(_) => Type::PreviousNode,
            Data::BundleAge(_) => Type::BundleAge,
            Data::HopCount(_) => Type::HopCount,
            Data::Unrecognised { type_code, .. } => Type::Unrecognised(*type_code),
        }
    }

    /// The block-type-specific data bytes carried in the block's byte string.
    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Data::Payload(data) => data.to_vec(),
            Data::PreviousNode(eid) => cbor::encode::emit(eid),
            Data::BundleAge(micros) => cbor::encode::emit(micros),
            Data::HopCount(info) => cbor::encode::emit(info),
            Data::Unrecognised { data, .. } => data.to_vec(),
        }
    }

    fn from_bytes(block_type: Type, data: &[u8]) -> Result<Self, Error> {
        match block_type {
            Type::Payload => Ok(Data::Payload(data.into())),
            Type::PreviousNode => Ok(Data::PreviousNode(
                cbor::decode::parse(data).map_field_err("previous node EID")?,
            )),
            Type::BundleAge => Ok(Data::BundleAge(
                cbor::decode::parse(data).map_field_err("bundle age")?,
            )),
            Type::HopCount => Ok(Data::HopCount(
                cbor::decode::parse(data).map_field_err("hop count")?,
            )),
            Type::Unrecognised(type_code) => Ok(Data::Unrecognised {
                type_code,
                data: data.into(),
            }),
        }
    }
}

/// A canonical (non-primary) block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub flags: Flags,
    pub crc_type: CrcType,
    pub data: Data,
}

impl Block {
    pub fn block_type(&self) -> Type {
        self.data.block_type()
    }

    /// Encode as a standalone CBOR array, CRC included.
    pub fn to_cbor(&self) -> Vec<u8> {
        let count = if let CrcType::None = self.crc_type {
            5
        } else {
            6
        };
        crc::append_crc_value(
            self.crc_type,
            cbor::encode::emit_array(count, |a| {
                a.emit(&u64::from(self.block_type()));
                a.emit(&self.number);
                a.emit(&u64::from(self.flags));
                a.emit(&self.crc_type);
                a.emit(&self.data.to_bytes());
                if !matches!(self.crc_type, CrcType::None) {
                    a.skip_value();
                }
            }),
        )
    }

    /// Parse the next item of `array` as a canonical block, verifying its
    /// CRC. `data` must be the buffer `array` is iterating over.
    pub(crate) fn parse(
        data: &[u8],
        array: &mut cbor::decode::Array,
    ) -> Result<Option<Block>, Error> {
        array.try_parse_array(|block, block_start, _| {
            let type_code: u64 = block.parse().map_field_err("block type code")?;
            if type_code == 0 {
                // Type 0 is the primary block, never a canonical one
                return Err(Error::InvalidBlockType(0));
            }
            let block_type = Type::from(type_code);

            let number: u64 = block.parse().map_field_err("block number")?;
            match (number, block_type) {
                (1, Type::Payload) => {}
                (0, _) | (1, _) | (_, Type::Payload) => {
                    return Err(Error::InvalidBlockNumber(number));
                }
                _ => {}
            }

            let flags: Flags = block
                .parse::<u64>()
                .map_field_err("block processing control flags")?
                .into();

            let crc_type: CrcType = block.parse().map_field_err("CRC type")?;

            let block_data = block
                .parse_value(|value, _, tags| match value {
                    cbor::decode::Value::Bytes(data, _) => Ok(data.to_vec()),
                    value => Err(cbor::decode::Error::IncorrectType(
                        "byte string",
                        value.type_name(!tags.is_empty()),
                    )),
                })
                .map_field_err("block data")?;

            crc::parse_crc_value(data, block_start, block, crc_type)?;

            Ok(Block {
                number,
                flags,
                crc_type,
                data: Data::from_bytes(block_type, &block_data)?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(block: Block) {
        // Parse through an outer array, as within a bundle
        let outer = {
            let mut e = cbor::encode::Encoder::default();
            e.emit_array(1, |a| a.emit_raw(&block.to_cbor()));
            e.into_inner()
        };
        let parsed = cbor::decode::parse_array(&outer, |a, _| {
            let b = Block::parse(&outer, a)?.ok_or(Error::MissingPayload)?;
            a.end()?;
            Ok::<_, Error>(b)
        })
        .map(|(b, _)| b)
        .unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn known_types_round_trip() {
        round_trip(Block {
            number: 1,
            flags: Flags::default(),
            crc_type: CrcType::None,
            data: Data::Payload(b"hello".as_slice().into()),
        });
        round_trip(Block {
            number: 2,
            flags: Flags {
                must_replicate: true,
                ..Default::default()
            },
            crc_type: CrcType::Crc16,
            data: Data::PreviousNode("dtn://relay/".parse().unwrap()),
        });
        round_trip(Block {
            number: 3,
            flags: Flags::default(),
            crc_type: CrcType::Crc32,
            data: Data::BundleAge(123_456),
        });
        round_trip(Block {
            number: 4,
            flags: Flags::default(),
            crc_type: CrcType::None,
            data: Data::HopCount(HopInfo { limit: 30, count: 2 }),
        });
    }

    #[test]
    fn unknown_types_keep_raw_bytes() {
        round_trip(Block {
            number: 5,
            flags: Flags::default(),
            crc_type: CrcType::Crc16,
            data: Data::Unrecognised {
                type_code: 192,
                data: cbor::encode::emit(&42u64).into(),
            },
        });
    }

    #[test]
    fn flag_bits() {
        let flags = Flags {
            must_replicate: true,
            report_on_failure: true,
            delete_bundle_on_failure: true,
            remove_block_on_failure: true,
            status_report_requested: true,
            unrecognised: 0,
        };
        assert_eq!(u64::from(flags), 0b11111);
        assert_eq!(Flags::from(0b11111u64), flags);

        // Unknown bits survive a round-trip
        let flags = Flags::from(1u64 << 9);
        assert_eq!(u64::from(flags), 1 << 9);
    }
}
