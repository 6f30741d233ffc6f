use super::*;
use crate::bundle::Bundle;
use crate::creation_timestamp::CreationTimestamp;
use crate::dtn_time::DtnTime;
use crate::eid::Eid;
use crate::error::CaptureFieldErr;

const STATUS_REPORT_RECORD_TYPE: u64 = 1;

const RECEIVED_FLAG: u64 = 0x01;
const FORWARDED_FLAG: u64 = 0x02;
const DELIVERED_FLAG: u64 = 0x04;
const DELETED_FLAG: u64 = 0x08;
const ACKNOWLEDGED_FLAG: u64 = 0x10;

/// Why a status report was generated.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReasonCode {
    #[default]
    NoAdditionalInformation,
    LifetimeExpired,
    ForwardedOverUnidirectionalLink,
    TransmissionCanceled,
    DepletedStorage,
    DestinationEndpointUnintelligible,
    NoKnownRouteToDestination,
    NoTimelyContactWithNextNode,
    BlockUnintelligible,
    HopLimitExceeded,
    TrafficPared,
    BlockUnsupported,
    Unrecognised(u64),
}

impl From<u64> for ReasonCode {
    fn from(value: u64) -> Self {
        match value {
            0 => Self::NoAdditionalInformation,
            1 => Self::LifetimeExpired,
            2 => Self::ForwardedOverUnidirectionalLink,
            3 => Self::TransmissionCanceled,
            4 => Self::DepletedStorage,
            5 => Self::DestinationEndpointUnintelligible,
            6 => Self::NoKnownRouteToDestination,
            7 => Self::NoTimelyContactWithNextNode,
            8 => Self::BlockUnintelligible,
            9 => Self::HopLimitExceeded,
            10 => Self::TrafficPared,
            11 => Self::BlockUnsupported,
            value => Self::Unrecognised(value),
        }
    }
}

impl From<ReasonCode> for u64 {
    fn from(value: ReasonCode) -> Self {
        match value {
            ReasonCode::NoAdditionalInformation => 0,
            ReasonCode::LifetimeExpired => 1,
            ReasonCode::ForwardedOverUnidirectionalLink => 2,
            ReasonCode::TransmissionCanceled => 3,
            ReasonCode::DepletedStorage => 4,
            ReasonCode::DestinationEndpointUnintelligible => 5,
            ReasonCode::NoKnownRouteToDestination => 6,
            ReasonCode::NoTimelyContactWithNextNode => 7,
            ReasonCode::BlockUnintelligible => 8,
            ReasonCode::HopLimitExceeded => 9,
            ReasonCode::TrafficPared => 10,
            ReasonCode::BlockUnsupported => 11,
            ReasonCode::Unrecognised(value) => value,
        }
    }
}

/// A bundle status report.
///
/// Each status that has been asserted carries the time at which it occurred;
/// unasserted statuses serialize as a zero time slot.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub source: Eid,
    pub timestamp: CreationTimestamp,
    pub fragment_offset: Option<u64>,
    pub reason: ReasonCode,
    pub received: Option<DtnTime>,
    pub forwarded: Option<DtnTime>,
    pub delivered: Option<DtnTime>,
    pub deleted: Option<DtnTime>,
    pub acknowledged: bool,
}

impl StatusReport {
    /// A report about `bundle` with no statuses asserted yet.
    pub fn for_bundle(bundle: &Bundle, reason: ReasonCode) -> Self {
        let id = bundle.id();
        Self {
            source: id.source,
            timestamp: id.timestamp,
            fragment_offset: id.fragment_offset,
            reason,
            ..Default::default()
        }
    }

    fn status_flags(&self) -> u64 {
        let mut flags = 0;
        if self.received.is_some() {
            flags |= RECEIVED_FLAG;
        }
        if self.forwarded.is_some() {
            flags |= FORWARDED_FLAG;
        }
        if self.delivered.is_some() {
            flags |= DELIVERED_FLAG;
        }
        if self.deleted.is_some() {
            flags |= DELETED_FLAG;
        }
        if self.acknowledged {
            flags |= ACKNOWLEDGED_FLAG;
        }
        flags
    }
}

fn emit_time_slot(a: &mut cbor::encode::Array, slot: &Option<DtnTime>) {
    a.emit(&slot.map_or(0, |t| t.secs()));
}

fn parse_time_slot(
    a: &mut cbor::decode::Array,
    asserted: bool,
) -> Result<Option<DtnTime>, Error> {
    let secs: u64 = a.parse().map_err(Error::from)?;
    if asserted {
        Ok(Some(DtnTime::new(secs, 0)))
    } else {
        Ok(None)
    }
}

/// An administrative record, carried in the payload block of a bundle whose
/// primary block has the administrative-record flag set.
///
/// Record types other than the bundle status report round-trip as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdministrativeRecord {
    StatusReport(StatusReport),
    Unrecognised { record_type: u64, data: Box<[u8]> },
}

impl AdministrativeRecord {
    /// Serialize into payload-block bytes.
    pub fn to_payload(&self) -> Box<[u8]> {
        match self {
            AdministrativeRecord::StatusReport(report) => cbor::encode::emit_array(2, |a| {
                a.emit(&STATUS_REPORT_RECORD_TYPE);
                let id_items = if report.fragment_offset.is_some() { 5 } else { 4 };
                a.emit_array(7, |a| {
                    a.emit(&report.status_flags());
                    a.emit(&u64::from(report.reason));
                    a.emit_array(id_items, |a| {
                        a.emit(&report.source.to_string());
                        a.emit(&report.timestamp.time);
                        a.emit(&report.timestamp.sequence_number);
                        a.emit(&u64::from(report.fragment_offset.is_some()));
                        if let Some(offset) = report.fragment_offset {
                            a.emit(&offset);
                        }
                    });
                    emit_time_slot(a, &report.received);
                    emit_time_slot(a, &report.forwarded);
                    emit_time_slot(a, &report.delivered);
                    emit_time_slot(a, &report.deleted);
                });
            })
            .into_boxed_slice(),
            AdministrativeRecord::Unrecognised { record_type, data } => {
                cbor::encode::emit_array(2, |a| {
                    a.emit(record_type);
                    a.emit_raw(data);
                })
                .into_boxed_slice()
            }
        }
    }

    /// Parse from payload-block bytes.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        cbor::decode::parse_array(data, |a, _| {
            let record_type: u64 = a.parse().map_field_err("administrative record type")?;
            if record_type != STATUS_REPORT_RECORD_TYPE {
                // Preserve the unread body verbatim
                let start = a.offset();
                a.skip_value()?;
                let end = a.end()?.ok_or(Error::AdditionalData)?;
                return Ok(AdministrativeRecord::Unrecognised {
                    record_type,
                    data: data[start..end].into(),
                });
            }

            let report = a
                .parse_array(|body, _, _| {
                    let flags: u64 = body.parse().map_field_err("status flags")?;
                    let reason: ReasonCode =
                        body.parse::<u64>().map_field_err("reason code")?.into();

                    let (source, timestamp, fragment_offset) = body
                        .parse_array(|id, _, _| {
                            let source: Eid = id
                                .parse::<String>()
                                .map_err(Error::from)?
                                .parse()
                                .map_err(Error::from)?;
                            let time: DtnTime = id.parse().map_err(Error::from)?;
                            let sequence_number: u64 = id.parse().map_err(Error::from)?;
                            let is_fragment: u64 = id.parse().map_err(Error::from)?;
                            let fragment_offset = if is_fragment != 0 {
                                Some(id.parse::<u64>().map_err(Error::from)?)
                            } else {
                                None
                            };
                            if id.end()?.is_none() {
                                return Err(Error::AdditionalData);
                            }
                            Ok((
                                source,
                                CreationTimestamp::new(time, sequence_number),
                                fragment_offset,
                            ))
                        })
                        .map_field_err("reported bundle id")?;

                    let received = parse_time_slot(body, flags & RECEIVED_FLAG != 0)?;
                    let forwarded = parse_time_slot(body, flags & FORWARDED_FLAG != 0)?;
                    let delivered = parse_time_slot(body, flags & DELIVERED_FLAG != 0)?;
                    let deleted = parse_time_slot(body, flags & DELETED_FLAG != 0)?;
                    if body.end()?.is_none() {
                        return Err(Error::AdditionalData);
                    }

                    Ok(StatusReport {
                        source,
                        timestamp,
                        fragment_offset,
                        reason,
                        received,
                        forwarded,
                        delivered,
                        deleted,
                        acknowledged: flags & ACKNOWLEDGED_FLAG != 0,
                    })
                })
                .map_field_err("status report body")?;

            if a.end()?.is_none() {
                return Err(Error::AdditionalData);
            }
            Ok(AdministrativeRecord::StatusReport(report))
        })
        .map(|(record, _)| record)
    }
}
