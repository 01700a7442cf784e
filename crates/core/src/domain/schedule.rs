use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::document::{DocumentId, DocumentStatus, DocumentType};
use crate::domain::refs::ProjectId;
use crate::errors::ValidationError;

/// Half-open interval `[start, end)` in local wall-clock time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ScheduleWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ValidationError> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end <= self.start {
            return Err(ValidationError::InvertedWindow { start: self.start, end: self.end });
        }
        Ok(())
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &ScheduleWindow) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// Window occupied by a deployment-type document, derived on read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledWindow {
    pub document_id: DocumentId,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    pub project_ids: BTreeSet<ProjectId>,
    pub window: ScheduleWindow,
}

impl ScheduledWindow {
    pub fn shares_project_with(&self, project_ids: &BTreeSet<ProjectId>) -> bool {
        !self.project_ids.is_disjoint(project_ids)
    }

    /// Only documents moving through approval hold their slot.
    pub fn blocks_schedule(&self) -> bool {
        matches!(
            self.status,
            DocumentStatus::Requested | DocumentStatus::Pending | DocumentStatus::Approved
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::ScheduleWindow;
    use crate::errors::ValidationError;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid timestamp")
    }

    #[test]
    fn inverted_and_empty_windows_are_rejected() {
        let error = ScheduleWindow::new(at("2024-06-02 02:00"), at("2024-06-01 22:00"))
            .expect_err("inverted window");
        assert!(matches!(error, ValidationError::InvertedWindow { .. }));

        let error = ScheduleWindow::new(at("2024-06-01 22:00"), at("2024-06-01 22:00"))
            .expect_err("empty window");
        assert!(matches!(error, ValidationError::InvertedWindow { .. }));
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        let first =
            ScheduleWindow::new(at("2024-06-01 20:00"), at("2024-06-01 22:00")).expect("valid window");
        let second =
            ScheduleWindow::new(at("2024-06-01 22:00"), at("2024-06-02 01:00")).expect("valid window");
        let third =
            ScheduleWindow::new(at("2024-06-01 21:59"), at("2024-06-01 22:30")).expect("valid window");

        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));
        assert!(first.overlaps(&third));
        assert!(third.overlaps(&second));
    }
}
