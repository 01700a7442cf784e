use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::DocumentStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOperation {
    Submit,
    RecordDecision,
    Cancel,
    Reschedule,
}

impl DocumentOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::RecordDecision => "record a decision on",
            Self::Cancel => "cancel",
            Self::Reschedule => "reschedule",
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Submit => "document.submitted",
            Self::RecordDecision => "document.decision_recorded",
            Self::Cancel => "document.canceled",
            Self::Reschedule => "document.rescheduled",
        }
    }
}

impl fmt::Display for DocumentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
    pub operation: DocumentOperation,
    /// False when the call was an idempotent repeat and nothing needs persisting.
    pub changed: bool,
}

impl TransitionOutcome {
    pub fn applied(from: DocumentStatus, to: DocumentStatus, operation: DocumentOperation) -> Self {
        Self { from, to, operation, changed: true }
    }

    pub fn unchanged(status: DocumentStatus, operation: DocumentOperation) -> Self {
        Self { from: status, to: status, operation, changed: false }
    }
}
