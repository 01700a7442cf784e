pub mod approvals;
pub mod audit;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod presentation;
pub mod scheduling;
pub mod workflow;

pub use approvals::{LineEvaluator, LineValidationError};
pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use collaborators::{AccountDirectory, BanStore, DocumentStore, ProjectDirectory, StoreError};
pub use domain::{
    AccountId, ApprovalDocument, ApprovalLine, BanId, BanPeriod, BanType, DocumentId,
    DocumentStatus, DocumentType, LineDecision, LineId, LineType, NewApprovalLine, NewBanPeriod,
    NewDocument, ProjectId, ScheduleWindow, ScheduledWindow,
};
pub use errors::{ApplicationError, ErrorKind, InterfaceError, ValidationError, WorkflowError};
pub use flows::{DecisionInput, DocumentOperation, DocumentStateMachine, TransitionOutcome};
pub use scheduling::{BanRegistry, ConflictChecker, ConflictReason, ScheduleConflict, WindowCheck};
pub use workflow::{ApprovalWorkflow, CommandContext, DocumentTransition, StatusPreview};

pub use chrono;
