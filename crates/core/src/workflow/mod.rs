//! Composes the ban registry, conflict checker, line evaluator and state machine into the
//! operations callers actually invoke.
//!
//! Every mutating call carries the caller's `expected_version`. The stored version is
//! checked up front and again by the store's compare-and-swap, so of two writers that read
//! the same version exactly one commits and the other gets `STALE_STATE`.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use crate::collaborators::{AccountDirectory, BanStore, DocumentStore, ProjectDirectory};
use crate::config::WorkflowConfig;
use crate::domain::{
    AccountId, ApprovalDocument, ApprovalLine, BanId, BanPeriod, DocumentId, DocumentStatus,
    LineId, NewBanPeriod, NewDocument, ProjectId, ScheduleWindow,
};
use crate::errors::{ApplicationError, EntityKind, ValidationError, WorkflowError};
use crate::flows::{DecisionInput, DocumentOperation, DocumentStateMachine, TransitionOutcome};
use crate::scheduling::{BanRegistry, ConflictChecker, WindowCheck};

pub mod locks;

pub use locks::{ProjectGuard, ProjectLocks};

/// Who is calling and the id that ties their logs and audit events together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    pub actor: AccountId,
    pub correlation_id: String,
}

impl CommandContext {
    pub fn new(actor: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self { actor: AccountId(actor.into()), correlation_id: correlation_id.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTransition {
    pub document: ApprovalDocument,
    pub outcome: TransitionOutcome,
}

/// Read-only view of where a document stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPreview {
    pub stored: DocumentStatus,
    pub derived: DocumentStatus,
    pub next_approver: Option<ApprovalLine>,
}

pub struct ApprovalWorkflow<D, B, P, A> {
    documents: Arc<D>,
    projects: Arc<P>,
    accounts: Arc<A>,
    bans: BanRegistry<B, P>,
    audit: Arc<dyn AuditSink>,
    settings: WorkflowConfig,
    locks: ProjectLocks,
    machine: DocumentStateMachine,
}

impl<D, B, P, A> ApprovalWorkflow<D, B, P, A>
where
    D: DocumentStore,
    B: BanStore,
    P: ProjectDirectory,
    A: AccountDirectory,
{
    pub fn new(documents: Arc<D>, bans: Arc<B>, projects: Arc<P>, accounts: Arc<A>) -> Self {
        Self {
            documents,
            bans: BanRegistry::new(bans, Arc::clone(&projects)),
            projects,
            accounts,
            audit: Arc::new(NoopAuditSink),
            settings: WorkflowConfig::default(),
            locks: ProjectLocks::default(),
            machine: DocumentStateMachine::default(),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_settings(mut self, settings: WorkflowConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn ban_registry(&self) -> &BanRegistry<B, P> {
        &self.bans
    }

    pub async fn create_document(
        &self,
        ctx: &CommandContext,
        request: NewDocument,
    ) -> Result<ApprovalDocument, ApplicationError> {
        let result = self.create_document_inner(ctx, request).await;
        match &result {
            Ok(document) => {
                info!(
                    event_name = "document.created",
                    correlation_id = %ctx.correlation_id,
                    document_id = %document.id,
                    document_type = document.document_type.as_str(),
                    actor = %ctx.actor,
                    "approval document drafted"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(document.id.clone()),
                        &ctx.correlation_id,
                        "document.created",
                        AuditCategory::Workflow,
                        &ctx.actor.0,
                        AuditOutcome::Success,
                    )
                    .with_metadata("document_type", document.document_type.as_str())
                    .with_metadata("lines", document.lines.len().to_string()),
                );
            }
            Err(error) => self.report_failure(ctx, None, "document.create_rejected", error),
        }
        result
    }

    async fn create_document_inner(
        &self,
        ctx: &CommandContext,
        request: NewDocument,
    ) -> Result<ApprovalDocument, ApplicationError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(ValidationError::BlankField { field: "title" }.into());
        }

        if let Some(window) = &request.schedule {
            window.validate()?;
        }

        let project_ids = if request.project_ids.is_empty() {
            if request.document_type.requires_schedule() {
                return Err(ValidationError::EmptyProjectSet.into());
            }
            BTreeSet::new()
        } else {
            self.resolve_projects(&request.project_ids).await?
        };

        self.ensure_account(&ctx.actor).await?;
        for line in &request.lines {
            self.ensure_account(&line.account_id).await?;
        }

        let now = Utc::now();
        let document_id = DocumentId(format!("DOC-{}", Uuid::new_v4()));
        let lines: Vec<ApprovalLine> = request
            .lines
            .into_iter()
            .enumerate()
            .map(|(position, line)| ApprovalLine {
                id: LineId(format!("LINE-{}", Uuid::new_v4())),
                document_id: document_id.clone(),
                account_id: line.account_id,
                line_type: line.line_type,
                position: position as u32,
                decision: None,
                comment: None,
                decided_at: None,
            })
            .collect();

        self.machine
            .evaluator()
            .validate_for_drafter(&lines, &ctx.actor)
            .map_err(WorkflowError::from)?;

        if self.settings.check_schedule_on_create && request.document_type.requires_schedule() {
            if let Some(window) = &request.schedule {
                if let WindowCheck::Conflict(conflict) =
                    self.check_window(&project_ids, window, None).await?
                {
                    return Err(WorkflowError::ScheduleConflict(conflict).into());
                }
            }
        }

        let document = ApprovalDocument {
            id: document_id,
            deployment_id: request.deployment_id,
            drafter_id: ctx.actor.clone(),
            document_type: request.document_type,
            status: DocumentStatus::Draft,
            title: title.to_owned(),
            content: request.content,
            project_ids,
            schedule: request.schedule,
            lines,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.documents.insert_document(document.clone()).await?;

        Ok(document)
    }

    pub async fn submit(
        &self,
        ctx: &CommandContext,
        document_id: &DocumentId,
        expected_version: u32,
    ) -> Result<DocumentTransition, ApplicationError> {
        let result = self.submit_inner(document_id, expected_version).await;
        self.report(ctx, document_id, DocumentOperation::Submit, &result);
        result
    }

    async fn submit_inner(
        &self,
        document_id: &DocumentId,
        expected_version: u32,
    ) -> Result<DocumentTransition, ApplicationError> {
        let snapshot = self.load(document_id).await?;
        let _guard = self.lock_projects(&snapshot.project_ids).await;

        // Re-read under the project locks so the check sees what the commit will replace.
        let mut document = self.load(document_id).await?;
        ensure_version(&document, expected_version)?;
        ensure_locked_projects(&snapshot, &document)?;

        let window_check = match (&document.schedule, document.status) {
            (Some(window), DocumentStatus::Draft)
                if document.document_type.requires_schedule() =>
            {
                self.check_window(&document.project_ids, window, Some(document_id)).await?
            }
            _ => WindowCheck::Accept,
        };

        let outcome = self.machine.submit(&mut document, &window_check, Utc::now())?;
        self.persist(document, expected_version, outcome).await
    }

    pub async fn record_decision(
        &self,
        ctx: &CommandContext,
        document_id: &DocumentId,
        expected_version: u32,
        input: DecisionInput,
    ) -> Result<DocumentTransition, ApplicationError> {
        let result = self.record_decision_inner(ctx, document_id, expected_version, &input).await;
        self.report(ctx, document_id, DocumentOperation::RecordDecision, &result);
        result
    }

    async fn record_decision_inner(
        &self,
        ctx: &CommandContext,
        document_id: &DocumentId,
        expected_version: u32,
        input: &DecisionInput,
    ) -> Result<DocumentTransition, ApplicationError> {
        let document = self.load(document_id).await?;
        let mut candidate = document.clone();

        match self.machine.record_decision(&mut candidate, &ctx.actor, input, Utc::now()) {
            // An identical repeat is answered from the stored state whatever version the
            // caller holds.
            Ok(outcome) if !outcome.changed => Ok(DocumentTransition { document, outcome }),
            result => {
                ensure_version(&document, expected_version)?;
                let outcome = result?;
                self.persist(candidate, expected_version, outcome).await
            }
        }
    }

    pub async fn cancel(
        &self,
        ctx: &CommandContext,
        document_id: &DocumentId,
        expected_version: u32,
    ) -> Result<DocumentTransition, ApplicationError> {
        let result = self.cancel_inner(ctx, document_id, expected_version).await;
        self.report(ctx, document_id, DocumentOperation::Cancel, &result);
        result
    }

    async fn cancel_inner(
        &self,
        ctx: &CommandContext,
        document_id: &DocumentId,
        expected_version: u32,
    ) -> Result<DocumentTransition, ApplicationError> {
        let mut document = self.load(document_id).await?;
        ensure_version(&document, expected_version)?;

        let outcome = self.machine.cancel(&mut document, &ctx.actor, Utc::now())?;
        self.persist(document, expected_version, outcome).await
    }

    /// Moves a DRAFT document to another window, re-checking it against everything but itself.
    pub async fn reschedule(
        &self,
        ctx: &CommandContext,
        document_id: &DocumentId,
        expected_version: u32,
        project_ids: Vec<ProjectId>,
        window: ScheduleWindow,
    ) -> Result<DocumentTransition, ApplicationError> {
        let result = self
            .reschedule_inner(ctx, document_id, expected_version, project_ids, window)
            .await;
        self.report(ctx, document_id, DocumentOperation::Reschedule, &result);
        result
    }

    async fn reschedule_inner(
        &self,
        ctx: &CommandContext,
        document_id: &DocumentId,
        expected_version: u32,
        project_ids: Vec<ProjectId>,
        window: ScheduleWindow,
    ) -> Result<DocumentTransition, ApplicationError> {
        window.validate()?;
        if project_ids.is_empty() {
            return Err(ValidationError::EmptyProjectSet.into());
        }
        let project_ids = self.resolve_projects(&project_ids).await?;
        let _guard = self.lock_projects(&project_ids).await;

        let mut document = self.load(document_id).await?;
        ensure_version(&document, expected_version)?;

        let window_check = if document.status == DocumentStatus::Draft {
            self.check_window(&project_ids, &window, Some(document_id)).await?
        } else {
            WindowCheck::Accept
        };

        let outcome = self.machine.reschedule(
            &mut document,
            &ctx.actor,
            project_ids,
            window,
            &window_check,
            Utc::now(),
        )?;
        self.persist(document, expected_version, outcome).await
    }

    pub async fn check_window(
        &self,
        project_ids: &BTreeSet<ProjectId>,
        window: &ScheduleWindow,
        exclude_document_id: Option<&DocumentId>,
    ) -> Result<WindowCheck, ApplicationError> {
        ConflictChecker::new(&self.bans, self.documents.as_ref())
            .check_window(project_ids, window, exclude_document_id)
            .await
    }

    pub async fn get_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<ApprovalDocument, ApplicationError> {
        self.load(document_id).await
    }

    pub async fn preview_status(
        &self,
        document_id: &DocumentId,
    ) -> Result<StatusPreview, ApplicationError> {
        let document = self.load(document_id).await?;
        let evaluator = self.machine.evaluator();

        Ok(StatusPreview {
            stored: document.status,
            derived: evaluator.derive_status(&document.lines),
            next_approver: evaluator.next_approver(&document.lines).cloned(),
        })
    }

    pub async fn create_ban(
        &self,
        ctx: &CommandContext,
        request: NewBanPeriod,
    ) -> Result<BanPeriod, ApplicationError> {
        let result = self.bans.create(&ctx.actor, request).await;
        match &result {
            Ok(ban) => {
                info!(
                    event_name = "ban.created",
                    correlation_id = %ctx.correlation_id,
                    ban_id = %ban.id.0,
                    ban_type = ban.ban_type.as_str(),
                    actor = %ctx.actor,
                    "ban period registered"
                );
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        &ctx.correlation_id,
                        "ban.created",
                        AuditCategory::BanRegistry,
                        &ctx.actor.0,
                        AuditOutcome::Success,
                    )
                    .with_metadata("ban_id", ban.id.0.clone())
                    .with_metadata("starts_at", ban.starts_at().to_string())
                    .with_metadata("ends_at", ban.ends_at().to_string()),
                );
            }
            Err(error) => self.report_failure(ctx, None, "ban.create_rejected", error),
        }
        result
    }

    pub async fn delete_ban(
        &self,
        ctx: &CommandContext,
        ban_id: &BanId,
    ) -> Result<BanPeriod, ApplicationError> {
        let result = self.bans.soft_delete(ban_id).await;
        match &result {
            Ok(ban) => {
                info!(
                    event_name = "ban.deleted",
                    correlation_id = %ctx.correlation_id,
                    ban_id = %ban.id.0,
                    actor = %ctx.actor,
                    "ban period soft-deleted"
                );
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        &ctx.correlation_id,
                        "ban.deleted",
                        AuditCategory::BanRegistry,
                        &ctx.actor.0,
                        AuditOutcome::Success,
                    )
                    .with_metadata("ban_id", ban.id.0.clone()),
                );
            }
            Err(error) => self.report_failure(ctx, None, "ban.delete_rejected", error),
        }
        result
    }

    pub async fn list_active_bans(
        &self,
        project_ids: &BTreeSet<ProjectId>,
        window: &ScheduleWindow,
    ) -> Result<Vec<BanPeriod>, ApplicationError> {
        self.bans.list_active(project_ids, window).await
    }

    async fn load(&self, document_id: &DocumentId) -> Result<ApprovalDocument, ApplicationError> {
        self.documents
            .load_document(document_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(EntityKind::Document, document_id).into())
    }

    async fn persist(
        &self,
        mut document: ApprovalDocument,
        expected_version: u32,
        outcome: TransitionOutcome,
    ) -> Result<DocumentTransition, ApplicationError> {
        document.version = expected_version + 1;
        self.documents.save_document(document.clone(), expected_version).await?;
        Ok(DocumentTransition { document, outcome })
    }

    async fn lock_projects(&self, project_ids: &BTreeSet<ProjectId>) -> Option<ProjectGuard> {
        if self.settings.lock_projects_on_submit {
            Some(self.locks.acquire(project_ids).await)
        } else {
            None
        }
    }

    async fn ensure_account(&self, account_id: &AccountId) -> Result<(), ApplicationError> {
        if self.accounts.account_exists(account_id).await? {
            Ok(())
        } else {
            Err(WorkflowError::not_found(EntityKind::Account, account_id).into())
        }
    }

    async fn resolve_projects(
        &self,
        project_ids: &[ProjectId],
    ) -> Result<BTreeSet<ProjectId>, ApplicationError> {
        let mut resolved = BTreeSet::new();
        for project_id in project_ids {
            if !resolved.insert(*project_id) {
                return Err(ValidationError::DuplicateProject(*project_id).into());
            }
        }

        let known = self.projects.projects_exist(project_ids).await?;
        if let Some(unknown) = resolved.iter().find(|id| !known.contains(id)) {
            return Err(ValidationError::UnknownProject(*unknown).into());
        }
        Ok(resolved)
    }

    fn report(
        &self,
        ctx: &CommandContext,
        document_id: &DocumentId,
        operation: DocumentOperation,
        result: &Result<DocumentTransition, ApplicationError>,
    ) {
        match result {
            Ok(transition) => {
                let outcome = &transition.outcome;
                info!(
                    event_name = operation.event_name(),
                    correlation_id = %ctx.correlation_id,
                    document_id = %document_id,
                    actor = %ctx.actor,
                    from = outcome.from.as_str(),
                    to = outcome.to.as_str(),
                    changed = outcome.changed,
                    version = transition.document.version,
                    "document transition applied"
                );
                if outcome.changed {
                    self.audit.emit(
                        AuditEvent::new(
                            Some(document_id.clone()),
                            &ctx.correlation_id,
                            operation.event_name(),
                            AuditCategory::Workflow,
                            &ctx.actor.0,
                            AuditOutcome::Success,
                        )
                        .with_metadata("from", outcome.from.as_str())
                        .with_metadata("to", outcome.to.as_str())
                        .with_metadata("version", transition.document.version.to_string()),
                    );
                }
            }
            Err(error) => {
                let event_type = format!("{}_rejected", operation.event_name());
                self.report_failure(ctx, Some(document_id), &event_type, error);
            }
        }
    }

    fn report_failure(
        &self,
        ctx: &CommandContext,
        document_id: Option<&DocumentId>,
        event_type: &str,
        error: &ApplicationError,
    ) {
        let error_class = error.kind().map(|kind| kind.as_str()).unwrap_or("persistence");
        warn!(
            event_name = event_type,
            correlation_id = %ctx.correlation_id,
            document_id = document_id.map(|id| id.0.as_str()).unwrap_or("none"),
            actor = %ctx.actor,
            error_class,
            error = %error,
            "workflow command rejected"
        );

        let (category, outcome) = match error {
            ApplicationError::Workflow(WorkflowError::ScheduleConflict(_)) => {
                (AuditCategory::Schedule, AuditOutcome::Rejected)
            }
            ApplicationError::Workflow(_) => (AuditCategory::Workflow, AuditOutcome::Rejected),
            _ => (AuditCategory::System, AuditOutcome::Failed),
        };
        self.audit.emit(
            AuditEvent::new(
                document_id.cloned(),
                &ctx.correlation_id,
                event_type,
                category,
                &ctx.actor.0,
                outcome,
            )
            .with_metadata("error_class", error_class)
            .with_metadata("message", error.to_string()),
        );
    }
}

fn ensure_version(
    document: &ApprovalDocument,
    expected_version: u32,
) -> Result<(), WorkflowError> {
    if document.version == expected_version {
        Ok(())
    } else {
        Err(WorkflowError::StaleState {
            document_id: document.id.clone(),
            expected: expected_version,
            actual: document.version,
        })
    }
}

/// The locks were taken for the snapshot's projects; a document that moved since is stale.
fn ensure_locked_projects(
    snapshot: &ApprovalDocument,
    current: &ApprovalDocument,
) -> Result<(), WorkflowError> {
    if snapshot.project_ids == current.project_ids {
        Ok(())
    } else {
        Err(WorkflowError::StaleState {
            document_id: current.id.clone(),
            expected: snapshot.version,
            actual: current.version,
        })
    }
}
