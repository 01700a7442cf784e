use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::refs::{AccountId, ProjectId};
use crate::domain::schedule::ScheduleWindow;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BanId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanType {
    RegularMaintenance,
    EmergencyMaintenance,
    Holiday,
    Freeze,
    Other,
}

impl BanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegularMaintenance => "regular_maintenance",
            Self::EmergencyMaintenance => "emergency_maintenance",
            Self::Holiday => "holiday",
            Self::Freeze => "freeze",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "regular_maintenance" => Some(Self::RegularMaintenance),
            "emergency_maintenance" => Some(Self::EmergencyMaintenance),
            "holiday" => Some(Self::Holiday),
            "freeze" => Some(Self::Freeze),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Maintenance window during which deployments to the related projects are disallowed.
///
/// Bans are soft-deleted so the audit trail keeps every window that was ever declared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanPeriod {
    pub id: BanId,
    pub title: String,
    pub ban_type: BanType,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_date: NaiveDate,
    pub end_time: NaiveTime,
    pub project_ids: BTreeSet<ProjectId>,
    pub created_by: AccountId,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BanPeriod {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.start_date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.end_date.and_time(self.end_time)
    }

    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    pub fn overlaps(&self, window: &ScheduleWindow) -> bool {
        self.starts_at() < window.end && self.ends_at() > window.start
    }

    pub fn affects_any(&self, project_ids: &BTreeSet<ProjectId>) -> bool {
        !self.project_ids.is_disjoint(project_ids)
    }

    /// Active, overlapping and sharing at least one project.
    pub fn blocks(&self, project_ids: &BTreeSet<ProjectId>, window: &ScheduleWindow) -> bool {
        self.is_active() && self.overlaps(window) && self.affects_any(project_ids)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBanPeriod {
    pub title: String,
    pub ban_type: BanType,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_date: NaiveDate,
    pub end_time: NaiveTime,
    pub related_project_ids: Vec<ProjectId>,
}

impl NewBanPeriod {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.start_date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.end_date.and_time(self.end_time)
    }
}
