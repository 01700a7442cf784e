//! Display labels for workflow enums.
//!
//! The enums themselves only carry identity; anything shown to people lives in these tables.

use crate::domain::{BanType, DocumentStatus, DocumentType, LineType};
use crate::scheduling::ConflictReason;

const STATUS_LABELS: &[(DocumentStatus, &str)] = &[
    (DocumentStatus::Draft, "Draft"),
    (DocumentStatus::Requested, "Awaiting drafter confirmation"),
    (DocumentStatus::Pending, "In approval"),
    (DocumentStatus::Approved, "Approved"),
    (DocumentStatus::Rejected, "Rejected"),
    (DocumentStatus::Canceled, "Canceled"),
];

const DOCUMENT_TYPE_LABELS: &[(DocumentType, &str)] = &[
    (DocumentType::Plan, "Release plan"),
    (DocumentType::Deployment, "Deployment"),
    (DocumentType::Report, "Release report"),
    (DocumentType::Retry, "Redeployment"),
    (DocumentType::Rollback, "Rollback"),
    (DocumentType::Draft, "Draft"),
];

const LINE_TYPE_LABELS: &[(LineType, &str)] = &[
    (LineType::Draft, "Drafter"),
    (LineType::Approve, "Approver"),
    (LineType::Consent, "Consenter"),
    (LineType::Cc, "CC"),
];

const BAN_TYPE_LABELS: &[(BanType, &str)] = &[
    (BanType::RegularMaintenance, "Regular maintenance"),
    (BanType::EmergencyMaintenance, "Emergency maintenance"),
    (BanType::Holiday, "Holiday"),
    (BanType::Freeze, "Release freeze"),
    (BanType::Other, "Other"),
];

const CONFLICT_LABELS: &[(ConflictReason, &str)] = &[
    (ConflictReason::BanOverlap, "Overlaps a ban period"),
    (ConflictReason::DeploymentOverlap, "Overlaps another scheduled deployment"),
];

fn lookup<T: PartialEq + Copy>(table: &[(T, &'static str)], key: T) -> &'static str {
    table.iter().find(|(candidate, _)| *candidate == key).map(|(_, label)| *label).unwrap_or("")
}

pub fn status_label(status: DocumentStatus) -> &'static str {
    lookup(STATUS_LABELS, status)
}

pub fn document_type_label(document_type: DocumentType) -> &'static str {
    lookup(DOCUMENT_TYPE_LABELS, document_type)
}

pub fn line_type_label(line_type: LineType) -> &'static str {
    lookup(LINE_TYPE_LABELS, line_type)
}

pub fn ban_type_label(ban_type: BanType) -> &'static str {
    lookup(BAN_TYPE_LABELS, ban_type)
}

pub fn conflict_label(reason: ConflictReason) -> &'static str {
    lookup(CONFLICT_LABELS, reason)
}

#[cfg(test)]
mod tests {
    use super::{ban_type_label, conflict_label, status_label, BAN_TYPE_LABELS, STATUS_LABELS};
    use crate::domain::{BanType, DocumentStatus};
    use crate::scheduling::ConflictReason;

    #[test]
    fn every_status_and_ban_type_has_a_label() {
        assert_eq!(STATUS_LABELS.len(), 6);
        assert_eq!(BAN_TYPE_LABELS.len(), 5);
        assert!(STATUS_LABELS.iter().all(|(status, _)| !status_label(*status).is_empty()));
        assert_eq!(status_label(DocumentStatus::Pending), "In approval");
        assert_eq!(ban_type_label(BanType::Freeze), "Release freeze");
        assert_eq!(conflict_label(ConflictReason::BanOverlap), "Overlaps a ban period");
    }
}
