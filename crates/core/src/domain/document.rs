use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::refs::{AccountId, DeploymentId, ProjectId};
use crate::domain::schedule::{ScheduleWindow, ScheduledWindow};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Plan,
    Deployment,
    Report,
    Retry,
    Rollback,
    Draft,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Deployment => "deployment",
            Self::Report => "report",
            Self::Retry => "retry",
            Self::Rollback => "rollback",
            Self::Draft => "draft",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plan" => Some(Self::Plan),
            "deployment" => Some(Self::Deployment),
            "report" => Some(Self::Report),
            "retry" => Some(Self::Retry),
            "rollback" => Some(Self::Rollback),
            "draft" => Some(Self::Draft),
            _ => None,
        }
    }

    /// Types that propose a window and must pass the conflict check on submit.
    pub fn requires_schedule(&self) -> bool {
        matches!(self, Self::Plan | Self::Deployment | Self::Retry | Self::Rollback)
    }

    /// Types whose window is counted against other deployments.
    pub fn occupies_schedule(&self) -> bool {
        matches!(self, Self::Deployment | Self::Retry | Self::Rollback)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Requested,
    Pending,
    Approved,
    Rejected,
    Canceled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Requested => "requested",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "requested" => Some(Self::Requested),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Canceled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    Draft,
    Approve,
    Consent,
    Cc,
}

impl LineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approve => "approve",
            Self::Consent => "consent",
            Self::Cc => "cc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "approve" => Some(Self::Approve),
            "consent" => Some(Self::Consent),
            "cc" => Some(Self::Cc),
            _ => None,
        }
    }

    /// APPROVE and CONSENT lines decide the document outcome.
    pub fn is_deciding(&self) -> bool {
        matches!(self, Self::Approve | Self::Consent)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineDecision {
    Approved,
    Rejected,
}

impl LineDecision {
    pub fn from_approved(approved: bool) -> Self {
        if approved {
            Self::Approved
        } else {
            Self::Rejected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLine {
    pub id: LineId,
    pub document_id: DocumentId,
    pub account_id: AccountId,
    pub line_type: LineType,
    pub position: u32,
    pub decision: Option<LineDecision>,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalLine {
    pub fn is_decided(&self) -> bool {
        self.decision.is_some()
    }

    pub fn is_approved(&self) -> bool {
        self.decision == Some(LineDecision::Approved)
    }
}

/// Approval workflow object for a plan, deployment, report, retry or rollback.
///
/// The document exclusively owns its lines; `ApprovalLine::document_id` is a lookup key only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDocument {
    pub id: DocumentId,
    pub deployment_id: Option<DeploymentId>,
    pub drafter_id: AccountId,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    pub title: String,
    pub content: String,
    pub project_ids: BTreeSet<ProjectId>,
    pub schedule: Option<ScheduleWindow>,
    pub lines: Vec<ApprovalLine>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalDocument {
    pub fn line(&self, line_id: &LineId) -> Option<&ApprovalLine> {
        self.lines.iter().find(|line| &line.id == line_id)
    }

    pub fn draft_line(&self) -> Option<&ApprovalLine> {
        self.lines.iter().find(|line| line.line_type == LineType::Draft)
    }

    /// Window this document holds against other deployments, if any.
    pub fn scheduled_window(&self) -> Option<ScheduledWindow> {
        if !self.document_type.occupies_schedule() {
            return None;
        }
        if matches!(self.status, DocumentStatus::Canceled | DocumentStatus::Rejected) {
            return None;
        }

        self.schedule.map(|window| ScheduledWindow {
            document_id: self.id.clone(),
            document_type: self.document_type,
            status: self.status,
            project_ids: self.project_ids.clone(),
            window,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprovalLine {
    pub account_id: AccountId,
    pub line_type: LineType,
}

impl NewApprovalLine {
    pub fn new(line_type: LineType, account_id: impl Into<String>) -> Self {
        Self { account_id: AccountId(account_id.into()), line_type }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub deployment_id: Option<DeploymentId>,
    pub document_type: DocumentType,
    pub title: String,
    pub content: String,
    pub project_ids: Vec<ProjectId>,
    pub schedule: Option<ScheduleWindow>,
    pub lines: Vec<NewApprovalLine>,
}
