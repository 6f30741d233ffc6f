use super::*;
use thiserror::Error;

/// The primary error type for the `bpv7` crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("bundle has additional data after the end of the CBOR array")]
    AdditionalData,

    #[error("unsupported bundle protocol version {0}")]
    InvalidVersion(u64),

    #[error("bundle has no payload block")]
    MissingPayload,

    #[error("bundle has more than one payload block")]
    DuplicatePayload,

    #[error("payload block must be block number 1")]
    InvalidPayloadBlockNumber,

    #[error("bundle has more than one block with block number {0}")]
    DuplicateBlockNumber(u64),

    #[error("invalid block number {0}")]
    InvalidBlockNumber(u64),

    #[error("invalid canonical block type code {0}")]
    InvalidBlockType(u64),

    #[error("block {0} carries data that does not match its type")]
    InvalidBlockData(u64),

    #[error("invalid fragment information: offset {0}, total length {1}")]
    InvalidFragmentInfo(u64, u64),

    #[error("fragment fields present without the is-fragment flag, or vice versa")]
    InconsistentFragmentInfo,

    #[error(transparent)]
    InvalidCrc(#[from] crc::Error),

    #[error(transparent)]
    InvalidEid(#[from] eid::EidError),

    #[error(transparent)]
    InvalidCbor(#[from] cbor::decode::Error),

    #[error("failed to parse {field}: {source}")]
    InvalidField {
        field: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Maps an error to [`Error::InvalidField`], naming the field that failed.
pub trait CaptureFieldErr<T> {
    fn map_field_err(self, field: &'static str) -> Result<T, Error>;
}

impl<T, E: Into<Box<dyn std::error::Error + Send + Sync>>> CaptureFieldErr<T>
    for std::result::Result<T, E>
{
    fn map_field_err(self, field: &'static str) -> Result<T, Error> {
        self.map_err(|e| Error::InvalidField {
            field,
            source: e.into(),
        })
    }
}
