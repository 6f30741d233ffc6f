use super::*;
use crate::dtn_time::DtnTime;
use crate::error::CaptureFieldErr;

/// The creation timestamp of a bundle: the DTN time of creation plus a
/// sequence number disambiguating bundles created within the same second.
#[derive(Default, Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CreationTimestamp {
    pub time: DtnTime,
    pub sequence_number: u64,
}

impl CreationTimestamp {
    pub fn new(time: DtnTime, sequence_number: u64) -> Self {
        Self {
            time,
            sequence_number,
        }
    }

    pub fn now() -> Self {
        let time = DtnTime::now();
        Self {
            sequence_number: (time.nanos() % 1_000_000) as u64,
            time,
        }
    }
}

impl std::fmt::Display for CreationTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.time.secs(), self.sequence_number)
    }
}

impl cbor::encode::ToCbor for CreationTimestamp {
    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) {
        encoder.emit_array(2, |a| {
            a.emit(&self.time);
            a.emit(&self.sequence_number);
        })
    }
}

impl cbor::decode::FromCbor for CreationTimestamp {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        cbor::decode::try_parse_array(data, |a, _| {
            let timestamp = Self {
                time: a.parse().map_field_err("bundle creation time")?,
                sequence_number: a.parse().map_field_err("sequence number")?,
            };
            if a.end()?.is_none() {
                return Err(Error::AdditionalData);
            }
            Ok(timestamp)
        })
        .map(|r| r.map(|(t, len)| (t, len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let ts = CreationTimestamp::new(DtnTime::new(812070972, 0), 42);
        let encoded = cbor::encode::emit(&ts);
        let decoded: CreationTimestamp = cbor::decode::parse(&encoded).unwrap();
        assert_eq!(ts, decoded);
    }

    #[test]
    fn rejects_extra_items() {
        let bad = cbor::encode::emit_array(3, |a| {
            a.emit(&1u64);
            a.emit(&2u64);
            a.emit(&3u64);
        });
        assert!(cbor::decode::parse::<CreationTimestamp>(&bad).is_err());
    }
}
