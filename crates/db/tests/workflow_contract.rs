use std::collections::BTreeSet;
use std::sync::Arc;

use rollout_core::chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rollout_core::config::WorkflowConfig;
use rollout_core::domain::{
    AccountId, BanType, DocumentStatus, DocumentType, LineType, NewApprovalLine, NewBanPeriod,
    NewDocument, ProjectId, ScheduleWindow,
};
use rollout_core::{
    ApprovalWorkflow, CommandContext, ConflictReason, DecisionInput, DocumentStore, ErrorKind,
    WorkflowError,
};
use rollout_db::{
    connect_with_settings, migrations, DbPool, SqlAccountDirectory, SqlBanStore, SqlDocumentStore,
    SqlProjectDirectory,
};

type SqlWorkflow =
    ApprovalWorkflow<SqlDocumentStore, SqlBanStore, SqlProjectDirectory, SqlAccountDirectory>;

async fn setup() -> (DbPool, SqlWorkflow) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");

    let projects = SqlProjectDirectory::new(pool.clone());
    projects.register(ProjectId(7), "payments-api").await.expect("register project");
    let accounts = SqlAccountDirectory::new(pool.clone());
    for id in ["alice", "bob", "carol", "scheduler"] {
        accounts.register(&AccountId::from(id), id).await.expect("register account");
    }

    let workflow = ApprovalWorkflow::new(
        Arc::new(SqlDocumentStore::new(pool.clone())),
        Arc::new(SqlBanStore::new(pool.clone())),
        Arc::new(projects),
        Arc::new(accounts),
    )
    .with_settings(WorkflowConfig::default());
    (pool, workflow)
}

fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid timestamp")
}

fn window(start: &str, end: &str) -> ScheduleWindow {
    ScheduleWindow::new(at(start), at(end)).expect("valid window")
}

fn ctx(actor: &str) -> CommandContext {
    CommandContext::new(actor, format!("it-{actor}"))
}

fn deployment(title: &str, scheduled: ScheduleWindow) -> NewDocument {
    NewDocument {
        deployment_id: None,
        document_type: DocumentType::Deployment,
        title: title.to_owned(),
        content: "Rolls out the settlement batcher.".to_owned(),
        project_ids: vec![ProjectId(7)],
        schedule: Some(scheduled),
        lines: vec![
            NewApprovalLine::new(LineType::Draft, "alice"),
            NewApprovalLine::new(LineType::Approve, "bob"),
            NewApprovalLine::new(LineType::Consent, "carol"),
        ],
    }
}

#[tokio::test]
async fn deployment_runs_through_approval_on_sqlite() {
    let (pool, workflow) = setup().await;

    workflow
        .create_ban(&ctx("scheduler"), NewBanPeriod {
            title: "Core switch replacement".to_owned(),
            ban_type: BanType::RegularMaintenance,
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).expect("date"),
            start_time: NaiveTime::from_hms_opt(22, 0, 0).expect("time"),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 2).expect("date"),
            end_time: NaiveTime::from_hms_opt(2, 0, 0).expect("time"),
            related_project_ids: vec![ProjectId(7)],
        })
        .await
        .expect("create ban");

    let document = workflow
        .create_document(
            &ctx("alice"),
            deployment("Night release", window("2024-06-01 23:00", "2024-06-02 00:30")),
        )
        .await
        .expect("create document");

    let error = workflow
        .submit(&ctx("alice"), &document.id, document.version)
        .await
        .expect_err("ban blocks the night window");
    match error.workflow() {
        Some(WorkflowError::ScheduleConflict(conflict)) => {
            assert_eq!(conflict.reason(), ConflictReason::BanOverlap);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let moved = workflow
        .reschedule(
            &ctx("alice"),
            &document.id,
            document.version,
            vec![ProjectId(7)],
            window("2024-06-03 10:00", "2024-06-03 11:00"),
        )
        .await
        .expect("reschedule");
    let requested = workflow
        .submit(&ctx("alice"), &document.id, moved.document.version)
        .await
        .expect("submit");
    assert_eq!(requested.document.status, DocumentStatus::Requested);

    let mut current = requested.document;
    for actor in ["alice", "bob", "carol"] {
        let line = current
            .lines
            .iter()
            .find(|line| line.account_id == AccountId::from(actor))
            .map(|line| line.id.clone())
            .expect("line for actor");
        current = workflow
            .record_decision(
                &ctx(actor),
                &document.id,
                current.version,
                DecisionInput::new(line, true, None),
            )
            .await
            .expect("approve")
            .document;
    }
    assert_eq!(current.status, DocumentStatus::Approved);

    let reloaded = SqlDocumentStore::new(pool.clone())
        .load_document(&document.id)
        .await
        .expect("reload")
        .expect("document persisted");
    assert_eq!(reloaded.status, DocumentStatus::Approved);
    assert_eq!(reloaded.version, current.version);
    assert!(reloaded.lines.iter().all(|line| line.is_approved()));

    let overlapping = workflow
        .create_document(
            &ctx("alice"),
            deployment("Hotfix", window("2024-06-03 10:30", "2024-06-03 12:00")),
        )
        .await
        .expect("create overlapping document");
    let error = workflow
        .submit(&ctx("alice"), &overlapping.id, overlapping.version)
        .await
        .expect_err("approved deployment holds the slot");
    match error.workflow() {
        Some(WorkflowError::ScheduleConflict(conflict)) => {
            assert_eq!(conflict.reason(), ConflictReason::DeploymentOverlap);
            assert_eq!(conflict.entry_ids(), vec![document.id.0.clone()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    pool.close().await;
}

#[tokio::test]
async fn stale_version_is_reported_by_the_sql_store() {
    let (pool, workflow) = setup().await;

    let document = workflow
        .create_document(
            &ctx("alice"),
            deployment("Morning release", window("2024-06-04 09:00", "2024-06-04 10:00")),
        )
        .await
        .expect("create document");

    workflow.submit(&ctx("alice"), &document.id, document.version).await.expect("first submit");
    let error = workflow
        .cancel(&ctx("alice"), &document.id, document.version)
        .await
        .expect_err("stale cancel");
    assert_eq!(error.kind(), Some(ErrorKind::StaleState));

    let check = workflow
        .check_window(
            &BTreeSet::from([ProjectId(7)]),
            &window("2024-06-04 09:30", "2024-06-04 09:45"),
            None,
        )
        .await
        .expect("check window");
    assert!(!check.is_accept());

    pool.close().await;
}
