use super::*;

const DTN_EPOCH: time::OffsetDateTime = time::macros::datetime!(2000-01-01 00:00:00 UTC);

/// An instant on the DTN timeline: seconds and nanoseconds since
/// 2000-01-01T00:00:00Z.
#[derive(Default, Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DtnTime {
    secs: u64,
    nanos: u32,
}

impl DtnTime {
    pub const ZERO: DtnTime = DtnTime { secs: 0, nanos: 0 };

    pub fn new(secs: u64, nanos: u32) -> Self {
        Self {
            secs: secs + (nanos / 1_000_000_000) as u64,
            nanos: nanos % 1_000_000_000,
        }
    }

    pub fn now() -> Self {
        let delta = time::OffsetDateTime::now_utc() - DTN_EPOCH;
        Self {
            secs: delta.whole_seconds().max(0) as u64,
            nanos: delta.subsec_nanoseconds().max(0) as u32,
        }
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Saturating addition of a duration.
    pub fn saturating_add(&self, d: core::time::Duration) -> Self {
        let nanos = self.nanos + d.subsec_nanos();
        Self {
            secs: self
                .secs
                .saturating_add(d.as_secs())
                .saturating_add((nanos / 1_000_000_000) as u64),
            nanos: nanos % 1_000_000_000,
        }
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future.
    pub fn duration_since(&self, earlier: DtnTime) -> core::time::Duration {
        if *self <= earlier {
            return core::time::Duration::ZERO;
        }
        let (mut secs, mut nanos) = (self.secs - earlier.secs, self.nanos as i64 - earlier.nanos as i64);
        if nanos < 0 {
            secs -= 1;
            nanos += 1_000_000_000;
        }
        core::time::Duration::new(secs, nanos as u32)
    }
}

impl std::fmt::Display for DtnTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = time::OffsetDateTime::from(*self);
        t.format(&time::format_description::well_known::Rfc3339)
            .map_err(|_| std::fmt::Error)
            .and_then(|s| f.write_str(&s))
    }
}

impl From<DtnTime> for time::OffsetDateTime {
    fn from(t: DtnTime) -> Self {
        DTN_EPOCH
            .saturating_add(time::Duration::seconds(t.secs.min(i64::MAX as u64) as i64))
            .saturating_add(time::Duration::nanoseconds(t.nanos as i64))
    }
}

impl TryFrom<time::OffsetDateTime> for DtnTime {
    type Error = time::error::ConversionRange;

    fn try_from(instant: time::OffsetDateTime) -> Result<Self, Self::Error> {
        let delta = instant - DTN_EPOCH;
        if delta.is_negative() {
            Err(time::error::ConversionRange)
        } else {
            Ok(Self {
                secs: delta.whole_seconds() as u64,
                nanos: delta.subsec_nanoseconds() as u32,
            })
        }
    }
}

impl cbor::encode::ToCbor for DtnTime {
    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) {
        encoder.emit(&self.secs)
    }
}

impl cbor::decode::FromCbor for DtnTime {
    type Error = cbor::decode::Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        Ok(u64::try_from_cbor(data)?.map(|(secs, len)| (Self { secs, nanos: 0 }, len)))
    }
}
