use super::*;

impl std::str::FromStr for Eid {
    type Err = EidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, ssp) = s.split_once(':').ok_or(EidError::MissingScheme)?;
        match scheme {
            "dtn" => parse_dtn(ssp),
            "ipn" => parse_ipn(ssp),
            _ => Err(EidError::UnsupportedScheme(scheme.to_string())),
        }
    }
}

fn parse_dtn(ssp: &str) -> Result<Eid, EidError> {
    if ssp == "none" {
        return Ok(Eid::Null);
    }

    let Some(rest) = ssp.strip_prefix("//") else {
        return Err(EidError::InvalidDtnSsp(ssp.to_string()));
    };

    // The node name runs up to the first '/'; everything after is the demux
    // path, which may legitimately be empty or contain empty segments.
    let Some((node_name, demux)) = rest.split_once('/') else {
        return Err(EidError::InvalidDtnSsp(ssp.to_string()));
    };
    if node_name.is_empty() {
        return Err(EidError::InvalidDtnSsp(ssp.to_string()));
    }

    let node_name = urlencoding::decode(node_name)
        .map_err(EidError::from)?
        .into_owned()
        .into_boxed_str();

    let demux = if demux.is_empty() {
        Box::default()
    } else {
        demux
            .split('/')
            .map(|s| {
                urlencoding::decode(s)
                    .map(|s| s.into_owned().into_boxed_str())
                    .map_err(EidError::from)
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_boxed_slice()
    };

    Ok(Eid::Dtn { node_name, demux })
}

fn parse_ipn(ssp: &str) -> Result<Eid, EidError> {
    let err = || EidError::InvalidIpnSsp(ssp.to_string());

    let (node, service) = ssp.split_once('.').ok_or_else(err)?;
    if service.contains('.') {
        return Err(err());
    }
    Ok(Eid::Ipn {
        node_number: node.parse().map_err(|_| err())?,
        service_number: service.parse().map_err(|_| err())?,
    })
}
