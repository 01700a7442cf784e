pub mod ban;
pub mod document;
pub mod refs;
pub mod schedule;

pub use ban::{BanId, BanPeriod, BanType, NewBanPeriod};
pub use document::{
    ApprovalDocument, ApprovalLine, DocumentId, DocumentStatus, DocumentType, LineDecision,
    LineId, LineType, NewApprovalLine, NewDocument,
};
pub use refs::{AccountId, DeploymentId, ProjectId};
pub use schedule::{ScheduleWindow, ScheduledWindow};
