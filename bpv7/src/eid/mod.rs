use super::*;
use thiserror::Error;

mod parse;


#[cfg(test)]
mod str_tests;

#[derive(Error, Debug)]
pub enum EidError {
    #[error("missing scheme separator")]
    MissingScheme,

    #[error("unsupported EID scheme {0}")]
    UnsupportedScheme(String),

    #[error("invalid dtn scheme-specific part '{0}'")]
    InvalidDtnSsp(String),

    #[error("invalid ipn scheme-specific part '{0}'")]
    InvalidIpnSsp(String),

    #[error("additional items found in EID array")]
    AdditionalItems,

    #[error(transparent)]
    InvalidCbor(#[from] cbor::decode::Error),

    #[error(transparent)]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// An endpoint identifier.
///
/// Two schemes are supported: `dtn`, with a node name and a demux path, and
/// `ipn`, with a numeric node and service pair. `dtn:none` is the null
/// endpoint, used where no endpoint is intended (e.g. report-to when no
/// reports are wanted).
///
/// Equality and ordering follow the normalized URI string form.
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq)]
pub enum Eid {
    #[default]
    Null,
    Dtn {
        node_name: Box<str>,
        demux: Box<[Box<str>]>,
    },
    Ipn {
        node_number: u64,
        service_number: u64,
    },
}

impl Eid {
    pub fn is_null(&self) -> bool {
        matches!(self, Eid::Null)
    }

    /// The URI scheme tag.
    pub fn scheme(&self) -> &'static str {
        match self {
            Eid::Null | Eid::Dtn { .. } => "dtn",
            Eid::Ipn { .. } => "ipn",
        }
    }

    /// The scheme-specific part of the URI.
    pub fn ssp(&self) -> String {
        match self {
            Eid::Null => "none".to_string(),
            Eid::Dtn { node_name, demux } => format!(
                "//{}/{}",
                urlencoding::encode(node_name),
                demux
                    .iter()
                    .map(|s| urlencoding::encode(s))
                    .collect::<Vec<_>>()
                    .join("/")
            ),
            Eid::Ipn {
                node_number,
                service_number,
            } => format!("{node_number}.{service_number}"),
        }
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scheme(), self.ssp())
    }
}

impl PartialOrd for Eid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Eid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl cbor::encode::ToCbor for Eid {
    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) {
        encoder.emit_array(2, |a| {
            a.emit(self.scheme());
            a.emit(&self.ssp());
        })
    }
}

impl cbor::decode::FromCbor for Eid {
    type Error = EidError;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        cbor::decode::try_parse_array(data, |a, _| {
            let scheme = a.parse::<String>().map_err(EidError::from)?;
            let ssp = a.parse::<String>().map_err(EidError::from)?;
            if a.end()?.is_none() {
                return Err(EidError::AdditionalItems);
            }
            format!("{scheme}:{ssp}").parse()
        })
        .map(|r| r.map(|(eid, len)| (eid, len)))
    }
}
