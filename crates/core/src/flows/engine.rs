use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::approvals::LineEvaluator;
use crate::domain::{
    AccountId, ApprovalDocument, DocumentStatus, LineDecision, LineId, LineType, ProjectId,
    ScheduleWindow,
};
use crate::errors::{EntityKind, ValidationError, WorkflowError};
use crate::flows::states::{DocumentOperation, TransitionOutcome};
use crate::scheduling::WindowCheck;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub line_id: LineId,
    pub decision: LineDecision,
    pub comment: Option<String>,
}

impl DecisionInput {
    pub fn new(line_id: LineId, approved: bool, comment: Option<String>) -> Self {
        Self { line_id, decision: LineDecision::from_approved(approved), comment }
    }
}

/// The only code allowed to move an approval document between states.
///
/// Works on an in-memory document; loading, locking and persisting are the caller's job.
#[derive(Clone, Debug, Default)]
pub struct DocumentStateMachine {
    evaluator: LineEvaluator,
}

impl DocumentStateMachine {
    pub fn new(evaluator: LineEvaluator) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &LineEvaluator {
        &self.evaluator
    }

    /// DRAFT -> REQUESTED, or straight to PENDING when there is no DRAFT line to acknowledge.
    pub fn submit(
        &self,
        document: &mut ApprovalDocument,
        window_check: &WindowCheck,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let from = document.status;
        if from != DocumentStatus::Draft {
            return Err(invalid_transition(from, DocumentOperation::Submit));
        }

        self.evaluator.validate_for_drafter(&document.lines, &document.drafter_id)?;

        if document.document_type.requires_schedule() {
            if document.schedule.is_none() {
                return Err(ValidationError::MissingSchedule {
                    document_type: document.document_type,
                }
                .into());
            }
            if let WindowCheck::Conflict(conflict) = window_check {
                return Err(WorkflowError::ScheduleConflict(conflict.clone()));
            }
        }

        let to = if document.draft_line().is_some() {
            DocumentStatus::Requested
        } else {
            DocumentStatus::Pending
        };
        document.status = to;
        document.updated_at = now;

        Ok(TransitionOutcome::applied(from, to, DocumentOperation::Submit))
    }

    pub fn record_decision(
        &self,
        document: &mut ApprovalDocument,
        actor: &AccountId,
        input: &DecisionInput,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let from = document.status;
        let operation = DocumentOperation::RecordDecision;

        let index = document
            .lines
            .iter()
            .position(|line| line.id == input.line_id)
            .ok_or_else(|| WorkflowError::not_found(EntityKind::Line, &input.line_id))?;
        let line = &document.lines[index];

        if &line.account_id != actor {
            return Err(ValidationError::NotPermitted {
                actor: actor.clone(),
                action: "act on another account's approval line",
            }
            .into());
        }

        let line_type = line.line_type;
        // Settled documents only take CC acknowledgments, repeats included.
        let settled = matches!(from, DocumentStatus::Approved | DocumentStatus::Rejected);
        if from == DocumentStatus::Canceled || (settled && line_type != LineType::Cc) {
            return Err(invalid_transition(from, operation));
        }

        if line.decision == Some(input.decision) && line.comment == input.comment {
            return Ok(TransitionOutcome::unchanged(from, operation));
        }

        match line_type {
            LineType::Draft => {
                if from != DocumentStatus::Requested {
                    return Err(invalid_transition(from, operation));
                }
                if input.decision == LineDecision::Rejected {
                    return Err(ValidationError::DraftLineRejection.into());
                }
            }
            LineType::Approve | LineType::Consent => {
                if from != DocumentStatus::Pending {
                    return Err(invalid_transition(from, operation));
                }
            }
            // CC acknowledgments are kept even after the outcome is settled; they never
            // feed the evaluation.
            LineType::Cc => {
                if matches!(from, DocumentStatus::Draft | DocumentStatus::Canceled) {
                    return Err(invalid_transition(from, operation));
                }
            }
        }

        if let Some(blocking) = self.evaluator.blocking_approver(&document.lines, line) {
            return Err(WorkflowError::OutOfOrder {
                line_id: line.id.0.clone(),
                blocking_line_id: blocking.id.0.clone(),
            });
        }

        let line = &mut document.lines[index];
        line.decision = Some(input.decision);
        line.comment = input.comment.clone();
        line.decided_at = Some(now);

        let to = match line_type {
            LineType::Draft => DocumentStatus::Pending,
            LineType::Approve | LineType::Consent => {
                match self.evaluator.derive_status(&document.lines) {
                    DocumentStatus::Rejected => DocumentStatus::Rejected,
                    DocumentStatus::Approved => DocumentStatus::Approved,
                    _ => DocumentStatus::Pending,
                }
            }
            LineType::Cc => from,
        };
        document.status = to;
        document.updated_at = now;

        Ok(TransitionOutcome::applied(from, to, operation))
    }

    pub fn cancel(
        &self,
        document: &mut ApprovalDocument,
        actor: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let from = document.status;
        if !matches!(
            from,
            DocumentStatus::Draft | DocumentStatus::Requested | DocumentStatus::Pending
        ) {
            return Err(invalid_transition(from, DocumentOperation::Cancel));
        }

        if actor != &document.drafter_id {
            return Err(ValidationError::NotPermitted {
                actor: actor.clone(),
                action: "cancel a document drafted by someone else",
            }
            .into());
        }

        document.status = DocumentStatus::Canceled;
        document.updated_at = now;

        Ok(TransitionOutcome::applied(from, DocumentStatus::Canceled, DocumentOperation::Cancel))
    }

    /// Moves a DRAFT document to a new window and project set once the check accepted it.
    pub fn reschedule(
        &self,
        document: &mut ApprovalDocument,
        actor: &AccountId,
        project_ids: BTreeSet<ProjectId>,
        window: ScheduleWindow,
        window_check: &WindowCheck,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let from = document.status;
        if from != DocumentStatus::Draft {
            return Err(invalid_transition(from, DocumentOperation::Reschedule));
        }

        if actor != &document.drafter_id {
            return Err(ValidationError::NotPermitted {
                actor: actor.clone(),
                action: "reschedule a document drafted by someone else",
            }
            .into());
        }

        if let WindowCheck::Conflict(conflict) = window_check {
            return Err(WorkflowError::ScheduleConflict(conflict.clone()));
        }

        document.project_ids = project_ids;
        document.schedule = Some(window);
        document.updated_at = now;

        Ok(TransitionOutcome::applied(from, from, DocumentOperation::Reschedule))
    }
}

fn invalid_transition(current: DocumentStatus, attempted: DocumentOperation) -> WorkflowError {
    WorkflowError::InvalidTransition { current, attempted }
}
