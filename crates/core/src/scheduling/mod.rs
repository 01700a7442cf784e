use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{BanPeriod, ScheduledWindow};

pub mod bans;
pub mod conflicts;

pub use bans::BanRegistry;
pub use conflicts::ConflictChecker;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictReason {
    BanOverlap,
    DeploymentOverlap,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BanOverlap => "BAN_OVERLAP",
            Self::DeploymentOverlap => "DEPLOYMENT_OVERLAP",
        }
    }
}

/// Why a proposed window was refused, with the entries that caused it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "entries", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleConflict {
    BanOverlap(Vec<BanPeriod>),
    DeploymentOverlap(Vec<ScheduledWindow>),
}

impl ScheduleConflict {
    pub fn reason(&self) -> ConflictReason {
        match self {
            Self::BanOverlap(_) => ConflictReason::BanOverlap,
            Self::DeploymentOverlap(_) => ConflictReason::DeploymentOverlap,
        }
    }

    /// Ids of the bans or documents in conflict, in reported order.
    pub fn entry_ids(&self) -> Vec<String> {
        match self {
            Self::BanOverlap(bans) => bans.iter().map(|ban| ban.id.0.clone()).collect(),
            Self::DeploymentOverlap(windows) => {
                windows.iter().map(|window| window.document_id.0.clone()).collect()
            }
        }
    }
}

impl fmt::Display for ScheduleConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with [{}]", self.reason().as_str(), self.entry_ids().join(", "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowCheck {
    Accept,
    Conflict(ScheduleConflict),
}

impl WindowCheck {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    pub fn conflict(&self) -> Option<&ScheduleConflict> {
        match self {
            Self::Accept => None,
            Self::Conflict(conflict) => Some(conflict),
        }
    }
}
