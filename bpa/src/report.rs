use super::*;
use crate::bpv7::{
    builder::Builder,
    bundle::Bundle,
    creation_timestamp::CreationTimestamp,
    dtn_time::DtnTime,
    eid::Eid,
    status_report::{AdministrativeRecord, ReasonCode, StatusReport},
};

/// Which status a report asserts about a bundle.
///
/// Forwarding reports are not emitted by this node; the engine's bundle-sent
/// trace covers that ground without generating network traffic.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum StatusKind {
    Received,
    Delivered,
    Deleted,
}

/// Build a status-report bundle about `subject`, or `None` when the subject
/// requests no report of this kind, has no report-to endpoint, or is itself
/// an administrative record.
pub(crate) fn new_status_report(
    subject: &Bundle,
    kind: StatusKind,
    reason: ReasonCode,
    local: &Eid,
    now: DtnTime,
) -> Option<Bundle> {
    if subject.is_admin_record() || subject.primary.report_to.is_null() {
        return None;
    }
    let flags = &subject.primary.flags;
    let requested = match kind {
        StatusKind::Received => flags.receipt_report_requested,
        StatusKind::Delivered => flags.delivery_report_requested,
        StatusKind::Deleted => flags.delete_report_requested,
    };
    if !requested {
        return None;
    }

    let mut report = StatusReport::for_bundle(subject, reason);
    match kind {
        StatusKind::Received => report.received = Some(now),
        StatusKind::Delivered => report.delivered = Some(now),
        StatusKind::Deleted => report.deleted = Some(now),
    }

    Some(
        Builder::new(local.clone(), subject.primary.report_to.clone())
            .is_admin_record()
            .with_lifetime(subject.primary.lifetime)
            .with_payload(AdministrativeRecord::StatusReport(report).to_payload())
            .build(CreationTimestamp::now()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(report_to: &str, delivery_report: bool) -> Bundle {
        let mut builder = Builder::new(
            "dtn://a/".parse().unwrap(),
            "dtn://b/".parse().unwrap(),
        )
        .with_report_to(report_to.parse().unwrap());
        if delivery_report {
            builder = builder.with_delivery_report();
        }
        builder
            .with_payload(b"data".as_slice())
            .build(CreationTimestamp::now())
    }

    #[test]
    fn delivered_report_targets_report_to() {
        let local: Eid = "dtn://b/".parse().unwrap();
        let subject = subject("dtn://a/", true);

        let report = new_status_report(
            &subject,
            StatusKind::Delivered,
            ReasonCode::NoAdditionalInformation,
            &local,
            DtnTime::now(),
        )
        .unwrap();

        assert!(report.is_admin_record());
        assert_eq!(report.primary.destination, subject.primary.report_to);
        assert_eq!(report.primary.source, local);

        match AdministrativeRecord::parse(report.payload().unwrap()).unwrap() {
            AdministrativeRecord::StatusReport(r) => {
                assert!(r.delivered.is_some());
                assert_eq!(r.source, subject.primary.source);
            }
            record => panic!("unexpected record {record:?}"),
        }
    }

    #[test]
    fn no_report_when_not_requested_or_no_target() {
        let local: Eid = "dtn://b/".parse().unwrap();
        let now = DtnTime::now();

        // Not requested
        let s = subject("dtn://a/", false);
        assert!(new_status_report(&s, StatusKind::Delivered, ReasonCode::default(), &local, now)
            .is_none());

        // Requested, but report-to is dtn:none
        let s = subject("dtn:none", true);
        assert!(new_status_report(&s, StatusKind::Delivered, ReasonCode::default(), &local, now)
            .is_none());
    }
}
