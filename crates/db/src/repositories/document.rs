use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};

use rollout_core::collaborators::{DocumentStore, StoreError};
use rollout_core::domain::{
    AccountId, ApprovalDocument, ApprovalLine, DeploymentId, DocumentId, DocumentStatus,
    DocumentType, LineDecision, LineId, LineType, ProjectId, ScheduleWindow, ScheduledWindow,
};

use super::{
    format_local, parse_enum, parse_local, parse_optional_timestamp, parse_timestamp, parse_u32,
    RepositoryError,
};
use crate::DbPool;

const DOCUMENT_COLUMNS: &str = "d.id, d.deployment_id, d.drafter_id, d.document_type, d.status, \
     d.title, d.content, d.schedule_start, d.schedule_end, d.version, d.created_at, d.updated_at";

/// Document types whose window counts against other deployments.
const SCHEDULE_OCCUPYING_TYPES: [DocumentType; 3] =
    [DocumentType::Deployment, DocumentType::Retry, DocumentType::Rollback];

#[derive(Clone)]
pub struct SqlDocumentStore {
    pool: DbPool,
}

impl SqlDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_document(
        &self,
        id: &DocumentId,
    ) -> Result<Option<ApprovalDocument>, RepositoryError> {
        let query = format!("SELECT {DOCUMENT_COLUMNS} FROM approval_document d WHERE d.id = ?");
        let Some(row) = sqlx::query(&query).bind(&id.0).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let project_rows = sqlx::query(
            "SELECT project_id FROM approval_document_project
             WHERE document_id = ? ORDER BY project_id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;
        let project_ids = project_rows
            .iter()
            .map(|row| -> Result<ProjectId, RepositoryError> {
                Ok(ProjectId(row.try_get("project_id")?))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let line_rows = sqlx::query(
            "SELECT id, document_id, account_id, line_type, position, decision, comment, decided_at
             FROM approval_line WHERE document_id = ? ORDER BY position ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;
        let lines = line_rows.iter().map(line_from_row).collect::<Result<Vec<_>, _>>()?;

        document_from_row(&row, project_ids, lines).map(Some)
    }

    async fn insert(&self, document: &ApprovalDocument) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approval_document (
                id, deployment_id, drafter_id, document_type, status, title, content,
                schedule_start, schedule_end, version, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id.0)
        .bind(document.deployment_id.as_ref().map(|deployment| deployment.0.as_str()))
        .bind(&document.drafter_id.0)
        .bind(document.document_type.as_str())
        .bind(document.status.as_str())
        .bind(&document.title)
        .bind(&document.content)
        .bind(document.schedule.map(|window| format_local(window.start)))
        .bind(document.schedule.map(|window| format_local(window.end)))
        .bind(i64::from(document.version))
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        write_projects(&mut tx, document).await?;
        write_lines(&mut tx, document).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Outer error is a backend failure; inner error is a lost compare-and-swap.
    async fn save(
        &self,
        document: &ApprovalDocument,
        expected_version: u32,
    ) -> Result<Result<(), StoreError>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE approval_document
             SET deployment_id = ?, document_type = ?, status = ?, title = ?, content = ?,
                 schedule_start = ?, schedule_end = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(document.deployment_id.as_ref().map(|deployment| deployment.0.as_str()))
        .bind(document.document_type.as_str())
        .bind(document.status.as_str())
        .bind(&document.title)
        .bind(&document.content)
        .bind(document.schedule.map(|window| format_local(window.start)))
        .bind(document.schedule.map(|window| format_local(window.end)))
        .bind(i64::from(document.version))
        .bind(document.updated_at.to_rfc3339())
        .bind(&document.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let stored: Option<i64> =
                sqlx::query_scalar("SELECT version FROM approval_document WHERE id = ?")
                    .bind(&document.id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            return Ok(Err(match stored {
                None => StoreError::Missing(document.id.0.clone()),
                Some(actual) => StoreError::VersionConflict {
                    document_id: document.id.clone(),
                    expected: expected_version,
                    actual: parse_u32("version", actual)?,
                },
            }));
        }

        sqlx::query("DELETE FROM approval_document_project WHERE document_id = ?")
            .bind(&document.id.0)
            .execute(&mut *tx)
            .await?;
        write_projects(&mut tx, document).await?;
        write_lines(&mut tx, document).await?;

        tx.commit().await?;
        Ok(Ok(()))
    }

    async fn scheduled_windows(
        &self,
        project_ids: &BTreeSet<ProjectId>,
    ) -> Result<Vec<ScheduledWindow>, RepositoryError> {
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT DISTINCT {DOCUMENT_COLUMNS}
             FROM approval_document d
             JOIN approval_document_project p ON p.document_id = d.id
             WHERE d.schedule_start IS NOT NULL
               AND d.status NOT IN ('canceled', 'rejected')
               AND d.document_type IN ("
        ));
        let mut separated = query_builder.separated(", ");
        for document_type in SCHEDULE_OCCUPYING_TYPES {
            separated.push_bind(document_type.as_str());
        }
        query_builder.push(") AND p.project_id IN (");
        let mut separated = query_builder.separated(", ");
        for project_id in project_ids {
            separated.push_bind(project_id.0);
        }
        query_builder.push(") ORDER BY d.schedule_start ASC, d.id ASC");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let document_ids =
            rows.iter().map(|row| row.try_get::<String, _>("id")).collect::<Result<Vec<_>, _>>()?;
        let mut projects_by_document = self.projects_for(&document_ids).await?;

        let mut windows = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            let project_ids = projects_by_document.remove(&id).unwrap_or_default();
            let document = document_from_row(row, project_ids, Vec::new())?;
            if let Some(window) = document.scheduled_window() {
                windows.push(window);
            }
        }
        Ok(windows)
    }

    async fn projects_for(
        &self,
        document_ids: &[String],
    ) -> Result<BTreeMap<String, BTreeSet<ProjectId>>, RepositoryError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT document_id, project_id FROM approval_document_project WHERE document_id IN (",
        );
        let mut separated = query_builder.separated(", ");
        for document_id in document_ids {
            separated.push_bind(document_id.as_str());
        }
        query_builder.push(")");

        let mut projects: BTreeMap<String, BTreeSet<ProjectId>> = BTreeMap::new();
        for row in query_builder.build().fetch_all(&self.pool).await? {
            let document_id: String = row.try_get("document_id")?;
            let project_id: i64 = row.try_get("project_id")?;
            projects.entry(document_id).or_default().insert(ProjectId(project_id));
        }
        Ok(projects)
    }
}

#[async_trait]
impl DocumentStore for SqlDocumentStore {
    async fn load_document(
        &self,
        id: &DocumentId,
    ) -> Result<Option<ApprovalDocument>, StoreError> {
        Ok(self.find_document(id).await?)
    }

    async fn insert_document(&self, document: ApprovalDocument) -> Result<(), StoreError> {
        Ok(self.insert(&document).await?)
    }

    async fn save_document(
        &self,
        document: ApprovalDocument,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        self.save(&document, expected_version).await?
    }

    async fn list_scheduled_windows(
        &self,
        project_ids: &BTreeSet<ProjectId>,
    ) -> Result<Vec<ScheduledWindow>, StoreError> {
        Ok(self.scheduled_windows(project_ids).await?)
    }
}

async fn write_projects(
    tx: &mut Transaction<'_, Sqlite>,
    document: &ApprovalDocument,
) -> Result<(), RepositoryError> {
    for project_id in &document.project_ids {
        sqlx::query(
            "INSERT INTO approval_document_project (document_id, project_id) VALUES (?, ?)",
        )
        .bind(&document.id.0)
        .bind(project_id.0)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn write_lines(
    tx: &mut Transaction<'_, Sqlite>,
    document: &ApprovalDocument,
) -> Result<(), RepositoryError> {
    for line in &document.lines {
        sqlx::query(
            "INSERT INTO approval_line (
                id, document_id, account_id, line_type, position, decision, comment, decided_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 decision = excluded.decision,
                 comment = excluded.comment,
                 decided_at = excluded.decided_at",
        )
        .bind(&line.id.0)
        .bind(&document.id.0)
        .bind(&line.account_id.0)
        .bind(line.line_type.as_str())
        .bind(i64::from(line.position))
        .bind(line.decision.map(|decision| decision.as_str()))
        .bind(line.comment.as_deref())
        .bind(line.decided_at.map(|decided_at| decided_at.to_rfc3339()))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn document_from_row(
    row: &SqliteRow,
    project_ids: BTreeSet<ProjectId>,
    lines: Vec<ApprovalLine>,
) -> Result<ApprovalDocument, RepositoryError> {
    let schedule_start: Option<String> = row.try_get("schedule_start")?;
    let schedule_end: Option<String> = row.try_get("schedule_end")?;
    let schedule = match (schedule_start, schedule_end) {
        (Some(start), Some(end)) => Some(
            ScheduleWindow::new(
                parse_local("schedule_start", start)?,
                parse_local("schedule_end", end)?,
            )
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        ),
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(
                "`schedule_start` and `schedule_end` must be set together".to_owned(),
            ))
        }
    };

    Ok(ApprovalDocument {
        id: DocumentId(row.try_get("id")?),
        deployment_id: row.try_get::<Option<String>, _>("deployment_id")?.map(DeploymentId),
        drafter_id: AccountId(row.try_get("drafter_id")?),
        document_type: parse_enum(
            "document_type",
            row.try_get("document_type")?,
            DocumentType::parse,
        )?,
        status: parse_enum("status", row.try_get("status")?, DocumentStatus::parse)?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        project_ids,
        schedule,
        lines,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn line_from_row(row: &SqliteRow) -> Result<ApprovalLine, RepositoryError> {
    let decision = row
        .try_get::<Option<String>, _>("decision")?
        .map(|value| parse_enum("decision", value, LineDecision::parse))
        .transpose()?;

    Ok(ApprovalLine {
        id: LineId(row.try_get("id")?),
        document_id: DocumentId(row.try_get("document_id")?),
        account_id: AccountId(row.try_get("account_id")?),
        line_type: parse_enum("line_type", row.try_get("line_type")?, LineType::parse)?,
        position: parse_u32("position", row.try_get("position")?)?,
        decision,
        comment: row.try_get("comment")?,
        decided_at: parse_optional_timestamp("decided_at", row.try_get("decided_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{DateTime, NaiveDateTime, Utc};

    use rollout_core::collaborators::{DocumentStore, StoreError};
    use rollout_core::domain::{
        AccountId, ApprovalDocument, ApprovalLine, DocumentId, DocumentStatus, DocumentType,
        LineDecision, LineId, LineType, ProjectId, ScheduleWindow,
    };

    use super::SqlDocumentStore;
    use crate::repositories::{SqlAccountDirectory, SqlProjectDirectory};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let projects = SqlProjectDirectory::new(pool.clone());
        for (id, name) in [(7, "payments-api"), (8, "ledger")] {
            projects.register(ProjectId(id), name).await.expect("register project");
        }
        let accounts = SqlAccountDirectory::new(pool.clone());
        for id in ["alice", "bob"] {
            accounts.register(&AccountId::from(id), id).await.expect("register account");
        }
        pool
    }

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid timestamp")
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample_document(
        id: &str,
        status: DocumentStatus,
        start: &str,
        end: &str,
    ) -> ApprovalDocument {
        let document_id = DocumentId(id.to_owned());
        let line = |suffix: &str, account: &str, line_type: LineType, position: u32| ApprovalLine {
            id: LineId(format!("{id}-{suffix}")),
            document_id: document_id.clone(),
            account_id: AccountId::from(account),
            line_type,
            position,
            decision: None,
            comment: None,
            decided_at: None,
        };

        ApprovalDocument {
            id: document_id.clone(),
            deployment_id: None,
            drafter_id: AccountId::from("alice"),
            document_type: DocumentType::Deployment,
            status,
            title: "Payments release".to_owned(),
            content: "Ship the ledger sync".to_owned(),
            project_ids: BTreeSet::from([ProjectId(7)]),
            schedule: Some(ScheduleWindow::new(at(start), at(end)).expect("valid window")),
            lines: vec![
                line("draft", "alice", LineType::Draft, 0),
                line("approve", "bob", LineType::Approve, 1),
            ],
            version: 1,
            created_at: parse_ts("2024-05-20T09:00:00Z"),
            updated_at: parse_ts("2024-05-20T09:00:00Z"),
        }
    }

    #[tokio::test]
    async fn insert_then_load_returns_document_with_ordered_lines() {
        let pool = setup_pool().await;
        let store = SqlDocumentStore::new(pool.clone());
        let document = sample_document(
            "DOC-1",
            DocumentStatus::Draft,
            "2024-06-03 10:00",
            "2024-06-03 11:00",
        );

        store.insert_document(document.clone()).await.expect("insert");

        let loaded = store.load_document(&document.id).await.expect("load").expect("present");
        assert_eq!(loaded, document);
        assert_eq!(
            loaded.lines.iter().map(|line| line.position).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert!(store
            .load_document(&DocumentId("DOC-missing".to_owned()))
            .await
            .expect("load missing")
            .is_none());

        let duplicate = store.insert_document(document).await.expect_err("duplicate insert");
        assert!(matches!(duplicate, StoreError::Duplicate(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn save_is_a_compare_and_swap_on_version() {
        let pool = setup_pool().await;
        let store = SqlDocumentStore::new(pool.clone());
        let document = sample_document(
            "DOC-1",
            DocumentStatus::Draft,
            "2024-06-03 10:00",
            "2024-06-03 11:00",
        );
        store.insert_document(document.clone()).await.expect("insert");

        let mut pending = document.clone();
        pending.status = DocumentStatus::Pending;
        pending.version = 2;
        pending.project_ids = BTreeSet::from([ProjectId(7), ProjectId(8)]);
        pending.lines[1].decision = Some(LineDecision::Approved);
        pending.lines[1].comment = Some("ship it".to_owned());
        pending.lines[1].decided_at = Some(parse_ts("2024-05-21T10:00:00Z"));
        store.save_document(pending.clone(), 1).await.expect("first save");

        let mut stale = document.clone();
        stale.status = DocumentStatus::Canceled;
        stale.version = 2;
        let error = store.save_document(stale, 1).await.expect_err("stale save");
        assert_eq!(error, StoreError::VersionConflict {
            document_id: document.id.clone(),
            expected: 1,
            actual: 2,
        });

        let loaded = store.load_document(&document.id).await.expect("load").expect("present");
        assert_eq!(loaded.status, DocumentStatus::Pending);
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.project_ids, pending.project_ids);
        assert_eq!(loaded.lines[1].decision, Some(LineDecision::Approved));
        assert_eq!(loaded.lines[1].comment.as_deref(), Some("ship it"));

        let mut ghost = sample_document(
            "DOC-ghost",
            DocumentStatus::Draft,
            "2024-06-03 10:00",
            "2024-06-03 11:00",
        );
        ghost.version = 2;
        let error = store.save_document(ghost, 1).await.expect_err("missing document");
        assert!(matches!(error, StoreError::Missing(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn scheduled_windows_skip_dead_documents_and_other_projects() {
        let pool = setup_pool().await;
        let store = SqlDocumentStore::new(pool.clone());

        let live = sample_document(
            "DOC-live",
            DocumentStatus::Pending,
            "2024-06-03 10:00",
            "2024-06-03 11:00",
        );
        let early = sample_document(
            "DOC-early",
            DocumentStatus::Approved,
            "2024-06-02 10:00",
            "2024-06-02 11:00",
        );
        let canceled = sample_document(
            "DOC-canceled",
            DocumentStatus::Canceled,
            "2024-06-03 10:00",
            "2024-06-03 11:00",
        );
        let mut other_project = sample_document(
            "DOC-other",
            DocumentStatus::Pending,
            "2024-06-03 10:00",
            "2024-06-03 11:00",
        );
        other_project.project_ids = BTreeSet::from([ProjectId(8)]);
        let mut report = sample_document(
            "DOC-report",
            DocumentStatus::Pending,
            "2024-06-03 10:00",
            "2024-06-03 11:00",
        );
        report.document_type = DocumentType::Report;

        for document in [live, early, canceled, other_project, report] {
            store.insert_document(document).await.expect("insert");
        }

        let windows = store
            .list_scheduled_windows(&BTreeSet::from([ProjectId(7)]))
            .await
            .expect("list windows");
        assert_eq!(
            windows.iter().map(|window| window.document_id.0.as_str()).collect::<Vec<_>>(),
            vec!["DOC-early", "DOC-live"]
        );
        assert_eq!(windows[1].status, DocumentStatus::Pending);
        assert_eq!(windows[1].project_ids, BTreeSet::from([ProjectId(7)]));

        assert!(store.list_scheduled_windows(&BTreeSet::new()).await.expect("empty").is_empty());

        pool.close().await;
    }
}
