use std::collections::HashSet;

use thiserror::Error;

use crate::domain::{AccountId, ApprovalLine, DocumentStatus, LineDecision, LineType};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LineValidationError {
    #[error("at least one APPROVE line is required")]
    MissingApproveLine,
    #[error("account `{account_id}` holds more than one {} line", .line_type.as_str())]
    DuplicateLine { account_id: AccountId, line_type: LineType },
    #[error("at most one DRAFT line is allowed, found {count}")]
    MultipleDraftLines { count: usize },
    #[error("DRAFT line must belong to drafter `{drafter}`, found `{account_id}`")]
    DraftLineNotDrafter { drafter: AccountId, account_id: AccountId },
}

/// Validates approval lines and derives a document outcome from their decisions.
///
/// Line order is the authority order: APPROVE lines act strictly in `position` order,
/// CONSENT lines act in any order and CC lines never block.
#[derive(Clone, Debug, Default)]
pub struct LineEvaluator;

impl LineEvaluator {
    pub fn validate(&self, lines: &[ApprovalLine]) -> Result<(), LineValidationError> {
        if !lines.iter().any(|line| line.line_type == LineType::Approve) {
            return Err(LineValidationError::MissingApproveLine);
        }

        let mut seen = HashSet::with_capacity(lines.len());
        for line in lines {
            if !seen.insert((line.line_type, &line.account_id)) {
                return Err(LineValidationError::DuplicateLine {
                    account_id: line.account_id.clone(),
                    line_type: line.line_type,
                });
            }
        }

        let draft_count = lines.iter().filter(|line| line.line_type == LineType::Draft).count();
        if draft_count > 1 {
            return Err(LineValidationError::MultipleDraftLines { count: draft_count });
        }

        Ok(())
    }

    /// `validate` plus the rule that the single DRAFT line names the drafter.
    pub fn validate_for_drafter(
        &self,
        lines: &[ApprovalLine],
        drafter: &AccountId,
    ) -> Result<(), LineValidationError> {
        self.validate(lines)?;

        if let Some(line) = lines.iter().find(|line| line.line_type == LineType::Draft) {
            if &line.account_id != drafter {
                return Err(LineValidationError::DraftLineNotDrafter {
                    drafter: drafter.clone(),
                    account_id: line.account_id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Pure read of the outcome the deciding lines imply.
    ///
    /// A rejection wins over undecided lines. A line set with no deciding lines stays pending.
    pub fn derive_status(&self, lines: &[ApprovalLine]) -> DocumentStatus {
        let mut deciding = lines.iter().filter(|line| line.line_type.is_deciding()).peekable();
        if deciding.peek().is_none() {
            return DocumentStatus::Pending;
        }

        let mut waiting = false;
        for line in deciding {
            match line.decision {
                Some(LineDecision::Rejected) => return DocumentStatus::Rejected,
                Some(LineDecision::Approved) => {}
                None => waiting = true,
            }
        }

        if waiting {
            DocumentStatus::Pending
        } else {
            DocumentStatus::Approved
        }
    }

    /// APPROVE lines in authority order.
    pub fn approval_order<'a>(&self, lines: &'a [ApprovalLine]) -> Vec<&'a ApprovalLine> {
        let mut ordered: Vec<&ApprovalLine> =
            lines.iter().filter(|line| line.line_type == LineType::Approve).collect();
        ordered.sort_by_key(|line| line.position);
        ordered
    }

    /// Earliest APPROVE line that has not approved yet.
    pub fn next_approver<'a>(&self, lines: &'a [ApprovalLine]) -> Option<&'a ApprovalLine> {
        self.approval_order(lines).into_iter().find(|line| !line.is_approved())
    }

    /// Earlier APPROVE line that must approve before `line` may act.
    pub fn blocking_approver<'a>(
        &self,
        lines: &'a [ApprovalLine],
        line: &ApprovalLine,
    ) -> Option<&'a ApprovalLine> {
        if line.line_type != LineType::Approve {
            return None;
        }

        self.approval_order(lines)
            .into_iter()
            .take_while(|earlier| earlier.position < line.position)
            .find(|earlier| !earlier.is_approved())
    }
}
