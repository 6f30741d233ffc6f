use super::*;
use thiserror::Error;

// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final XOR
const CRC16: ::crc::Crc<u16> = ::crc::Crc::<u16>::new(&::crc::CRC_16_IBM_3740);

// CRC-32/Castagnoli: poly 0x1EDC6F41 reflected, init/xorout 0xFFFFFFFF
const CRC32: ::crc::Crc<u32> = ::crc::Crc::<u32>::new(&::crc::CRC_32_ISCSI);

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid CRC type {0}")]
    InvalidType(u64),

    #[error("block has an unexpected CRC value length {0}")]
    InvalidLength(usize),

    #[error("block has a CRC value but no CRC type")]
    UnexpectedCrcValue,

    #[error("block is missing its CRC value")]
    MissingCrcValue,

    #[error("incorrect CRC value")]
    IncorrectCrc,

    #[error(transparent)]
    InvalidCbor(#[from] cbor::decode::Error),
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CrcType {
    #[default]
    None,
    Crc16,
    Crc32,
}

impl TryFrom<u64> for CrcType {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Crc16),
            2 => Ok(Self::Crc32),
            v => Err(Error::InvalidType(v)),
        }
    }
}

impl From<CrcType> for u64 {
    fn from(value: CrcType) -> Self {
        match value {
            CrcType::None => 0,
            CrcType::Crc16 => 1,
            CrcType::Crc32 => 2,
        }
    }
}

impl cbor::encode::ToCbor for CrcType {
    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) {
        encoder.emit(&u64::from(*self))
    }
}

impl cbor::decode::FromCbor for CrcType {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        match u64::try_from_cbor(data)? {
            Some((v, len)) => Ok(Some((v.try_into()?, len))),
            None => Ok(None),
        }
    }
}

/// Append the CRC byte string to an encoded block.
///
/// `block` must be a block CBOR array that accounts for the CRC item but does
/// not yet contain it. The digest is computed over the image with the CRC
/// value bytes zeroed, then the real value is written in place of the zeros.
pub fn append_crc_value(crc_type: CrcType, mut block: Vec<u8>) -> Vec<u8> {
    match crc_type {
        CrcType::None => {}
        CrcType::Crc16 => {
            block.push(0x42);
            let mut digest = CRC16.digest();
            digest.update(&block);
            digest.update(&[0; 2]);
            block.extend(digest.finalize().to_be_bytes());
        }
        CrcType::Crc32 => {
            block.push(0x44);
            let mut digest = CRC32.digest();
            digest.update(&block);
            digest.update(&[0; 4]);
            block.extend(digest.finalize().to_be_bytes());
        }
    }
    block
}

/// Parse and verify the trailing CRC item of a block.
///
/// `data` is the buffer the block was parsed from and `block_start` the
/// offset of the block's array header within it; `block` must be positioned
/// at the CRC item (all preceding items consumed). Verification blanks the
/// CRC value bytes and compares digests.
pub fn parse_crc_value(
    data: &[u8],
    block_start: usize,
    block: &mut cbor::decode::Array,
    crc_type: CrcType,
) -> Result<(), Error> {
    let crc_value = block.try_parse_value(|value, _, tags| match value {
        cbor::decode::Value::Bytes(crc, false) => match crc_type {
            CrcType::None => Err(Error::UnexpectedCrcValue),
            CrcType::Crc16 => {
                if crc.len() != 2 {
                    Err(Error::InvalidLength(crc.len()))
                } else {
                    Ok(u16::from_be_bytes(crc.try_into().unwrap()) as u32)
                }
            }
            CrcType::Crc32 => {
                if crc.len() != 4 {
                    Err(Error::InvalidLength(crc.len()))
                } else {
                    Ok(u32::from_be_bytes(crc.try_into().unwrap()))
                }
            }
        },
        value => Err(cbor::decode::Error::IncorrectType(
            "byte string",
            value.type_name(!tags.is_empty()),
        )
        .into()),
    })?;

    let crc_val_end = block.offset();
    let crc_end = block.end()?.unwrap_or(crc_val_end);

    match (crc_type, crc_value) {
        (CrcType::None, None) => Ok(()),
        (CrcType::Crc16, Some(crc_value)) => {
            let mut digest = CRC16.digest();
            digest.update(&data[block_start..crc_val_end - 2]);
            digest.update(&[0; 2]);
            digest.update(&data[crc_val_end..crc_end]);
            if crc_value != digest.finalize() as u32 {
                Err(Error::IncorrectCrc)
            } else {
                Ok(())
            }
        }
        (CrcType::Crc32, Some(crc_value)) => {
            let mut digest = CRC32.digest();
            digest.update(&data[block_start..crc_val_end - 4]);
            digest.update(&[0; 4]);
            digest.update(&data[crc_val_end..crc_end]);
            if crc_value != digest.finalize() {
                Err(Error::IncorrectCrc)
            } else {
                Ok(())
            }
        }
        _ => Err(Error::MissingCrcValue),
    }
}
