use rollout_core::chrono::NaiveDateTime;
use rollout_core::domain::DeploymentId;
use rollout_core::{
    ApplicationError, ApprovalDocument, CommandContext, DecisionInput, DocumentId,
    DocumentTransition, DocumentType, LineId, NewApprovalLine, NewDocument, ProjectId,
    ScheduleWindow, StatusPreview,
};
use serde::Serialize;

use crate::commands::{correlation_id, run_with_pool, workflow, CommandFailure, CommandResult};

#[derive(Clone, Debug)]
pub struct CreateDocument {
    pub document_type: DocumentType,
    pub title: String,
    pub content: String,
    pub deployment_id: Option<String>,
    pub project_ids: Vec<i64>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub lines: Vec<NewApprovalLine>,
    pub actor: String,
}

#[derive(Debug, Serialize)]
struct DocumentView {
    document: ApprovalDocument,
    preview: StatusPreview,
}

#[derive(Clone, Debug)]
pub struct Decide {
    pub document_id: String,
    pub version: u32,
    pub line_id: String,
    pub approve: bool,
    pub comment: Option<String>,
    pub actor: String,
}

pub fn create(request: CreateDocument) -> CommandResult {
    run_with_pool("document.create", |config, pool| async move {
        let ctx = CommandContext::new(request.actor, correlation_id("document.create"));
        let schedule = match (request.start, request.end) {
            (Some(start), Some(end)) => {
                let window = ScheduleWindow::new(start, end).map_err(ApplicationError::from);
                Some(window.map_err(|error| {
                    CommandFailure::from_application(error, &ctx.correlation_id)
                })?)
            }
            (None, None) => None,
            _ => {
                return Err(CommandFailure::new(
                    "VALIDATION",
                    "--start and --end must be given together",
                    6,
                ))
            }
        };

        let document = workflow(&config, &pool)
            .create_document(&ctx, NewDocument {
                deployment_id: request.deployment_id.map(DeploymentId),
                document_type: request.document_type,
                title: request.title,
                content: request.content,
                project_ids: request.project_ids.into_iter().map(ProjectId).collect(),
                schedule,
                lines: request.lines,
            })
            .await
            .map_err(|error| CommandFailure::from_application(error, &ctx.correlation_id))?;

        Ok(CommandResult::success_with_data(
            "document.create",
            format!("drafted document {}", document.id),
            &document,
        ))
    })
}

pub fn show(document_id: &str) -> CommandResult {
    let document_id = DocumentId(document_id.trim().to_owned());

    run_with_pool("document.show", |config, pool| async move {
        let correlation_id = correlation_id("document.show");
        let workflow = workflow(&config, &pool);
        let document = workflow
            .get_document(&document_id)
            .await
            .map_err(|error| CommandFailure::from_application(error, &correlation_id))?;
        let preview = workflow
            .preview_status(&document_id)
            .await
            .map_err(|error| CommandFailure::from_application(error, &correlation_id))?;

        Ok(CommandResult::success_with_data(
            "document.show",
            format!("document {} is {}", document.id, document.status.as_str()),
            &DocumentView { document, preview },
        ))
    })
}

pub fn submit(document_id: &str, version: u32, actor: &str) -> CommandResult {
    let document_id = DocumentId(document_id.trim().to_owned());
    let actor = actor.to_owned();

    run_with_pool("document.submit", |config, pool| async move {
        let ctx = CommandContext::new(actor, correlation_id("document.submit"));
        let transition = workflow(&config, &pool)
            .submit(&ctx, &document_id, version)
            .await
            .map_err(|error| CommandFailure::from_application(error, &ctx.correlation_id))?;

        Ok(transition_result("document.submit", &transition))
    })
}

pub fn decide(request: Decide) -> CommandResult {
    run_with_pool("document.decide", |config, pool| async move {
        let ctx = CommandContext::new(request.actor, correlation_id("document.decide"));
        let document_id = DocumentId(request.document_id.trim().to_owned());
        let input = DecisionInput::new(
            LineId(request.line_id.trim().to_owned()),
            request.approve,
            request.comment,
        );

        let transition = workflow(&config, &pool)
            .record_decision(&ctx, &document_id, request.version, input)
            .await
            .map_err(|error| CommandFailure::from_application(error, &ctx.correlation_id))?;

        Ok(transition_result("document.decide", &transition))
    })
}

pub fn cancel(document_id: &str, version: u32, actor: &str) -> CommandResult {
    let document_id = DocumentId(document_id.trim().to_owned());
    let actor = actor.to_owned();

    run_with_pool("document.cancel", |config, pool| async move {
        let ctx = CommandContext::new(actor, correlation_id("document.cancel"));
        let transition = workflow(&config, &pool)
            .cancel(&ctx, &document_id, version)
            .await
            .map_err(|error| CommandFailure::from_application(error, &ctx.correlation_id))?;

        Ok(transition_result("document.cancel", &transition))
    })
}

fn transition_result(command: &str, transition: &DocumentTransition) -> CommandResult {
    let outcome = &transition.outcome;
    let message = if outcome.changed {
        format!(
            "document {} moved {} -> {} (version {})",
            transition.document.id,
            outcome.from.as_str(),
            outcome.to.as_str(),
            transition.document.version
        )
    } else {
        format!("document {} unchanged", transition.document.id)
    };
    CommandResult::success_with_data(command, message, transition)
}
