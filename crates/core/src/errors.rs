use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::LineValidationError;
use crate::collaborators::StoreError;
use crate::domain::{AccountId, DocumentId, DocumentStatus, DocumentType, ProjectId};
use crate::flows::DocumentOperation;
use crate::scheduling::ScheduleConflict;

/// Caller-facing error classes. Every workflow failure maps to exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    ScheduleConflict,
    InvalidTransition,
    OutOfOrder,
    StaleState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::ScheduleConflict => "SCHEDULE_CONFLICT",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::OutOfOrder => "OUT_OF_ORDER",
            Self::StaleState => "STALE_STATE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Document,
    Line,
    Ban,
    Account,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Line => "approval line",
            Self::Ban => "ban period",
            Self::Account => "account",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("window end {end} must be after start {start}")]
    InvertedWindow { start: NaiveDateTime, end: NaiveDateTime },
    #[error("at least one project is required")]
    EmptyProjectSet,
    #[error("project {0} is listed more than once")]
    DuplicateProject(ProjectId),
    #[error("project {0} is not known to the project directory")]
    UnknownProject(ProjectId),
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },
    #[error("{document_type:?} documents require a schedule window")]
    MissingSchedule { document_type: DocumentType },
    #[error("account `{actor}` is not allowed to {action}")]
    NotPermitted { actor: AccountId, action: &'static str },
    #[error("the drafter acknowledgment line cannot reject; cancel the document instead")]
    DraftLineRejection,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid approval lines: {0}")]
    InvalidLines(#[from] LineValidationError),
    #[error("{} `{id}` not found", .entity.as_str())]
    NotFound { entity: EntityKind, id: String },
    #[error("schedule conflict: {0}")]
    ScheduleConflict(ScheduleConflict),
    #[error("cannot {attempted} a document in {} state", .current.as_str())]
    InvalidTransition { current: DocumentStatus, attempted: DocumentOperation },
    #[error("approval line `{line_id}` must wait for line `{blocking_line_id}` to approve")]
    OutOfOrder { line_id: String, blocking_line_id: String },
    #[error("document `{document_id}` is at version {actual}, caller expected {expected}")]
    StaleState { document_id: DocumentId, expected: u32, actual: u32 },
}

impl WorkflowError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidLines(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ScheduleConflict(_) => ErrorKind::ScheduleConflict,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::OutOfOrder { .. } => ErrorKind::OutOfOrder,
            Self::StaleState { .. } => ErrorKind::StaleState,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// `None` for infrastructure failures that carry no workflow meaning.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Workflow(error) => Some(error.kind()),
            Self::Persistence(_) | Self::Configuration(_) => None,
        }
    }

    pub fn workflow(&self) -> Option<&WorkflowError> {
        match self {
            Self::Workflow(error) => Some(error),
            _ => None,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ValidationError> for ApplicationError {
    fn from(value: ValidationError) -> Self {
        Self::Workflow(WorkflowError::Validation(value))
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::VersionConflict { document_id, expected, actual } => {
                Self::Workflow(WorkflowError::StaleState { document_id, expected, actual })
            }
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request ({error_class}): {message}")]
    BadRequest { error_class: String, message: String, correlation_id: String },
    #[error("conflict ({error_class}): {message}")]
    Conflict { error_class: String, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn error_class(&self) -> &str {
        match self {
            Self::BadRequest { error_class, .. } | Self::Conflict { error_class, .. } => {
                error_class
            }
            Self::ServiceUnavailable { .. } => "persistence",
            Self::Internal { .. } => "configuration",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The request conflicts with the current state. Reload and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Workflow(error) => {
                let error_class = error.kind().as_str().to_owned();
                let message = error.to_string();
                match error.kind() {
                    ErrorKind::Validation | ErrorKind::NotFound => {
                        Self::BadRequest { error_class, message, correlation_id }
                    }
                    ErrorKind::ScheduleConflict
                    | ErrorKind::InvalidTransition
                    | ErrorKind::OutOfOrder
                    | ErrorKind::StaleState => {
                        Self::Conflict { error_class, message, correlation_id }
                    }
                }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
