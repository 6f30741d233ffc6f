use super::*;
use crate::error::CaptureFieldErr;

/// Hop limit and hop count carried by a hop-count block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HopInfo {
    /// The maximum number of hops the bundle may traverse.
    pub limit: u64,
    /// The number of hops already traversed.
    pub count: u64,
}

impl HopInfo {
    pub fn new(limit: u64) -> Self {
        Self { limit, count: 0 }
    }

    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn exceeded(&self) -> bool {
        self.count >= self.limit
    }
}

impl cbor::encode::ToCbor for HopInfo {
    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) {
        encoder.emit(&(self.limit, self.count))
    }
}

impl cbor::decode::FromCbor for HopInfo {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        cbor::decode::try_parse_array(data, |a, _| {
            let info = HopInfo {
                limit: a.parse().map_field_err("hop limit")?,
                count: a.parse().map_field_err("hop count")?,
            };
            if a.end()?.is_none() {
                return Err(Error::AdditionalData);
            }
            Ok(info)
        })
        .map(|r| r.map(|(v, len)| (v, len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_semantics() {
        let mut info = HopInfo::new(2);
        assert!(!info.exceeded());
        info.increment();
        assert!(!info.exceeded());
        info.increment();
        assert!(info.exceeded());
    }

    #[test]
    fn round_trip() {
        let info = HopInfo { limit: 30, count: 7 };
        let decoded: HopInfo = cbor::decode::parse(&cbor::encode::emit(&info)).unwrap();
        assert_eq!(info, decoded);
    }
}
