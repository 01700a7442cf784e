use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use rollout_core::collaborators::{AccountDirectory, ProjectDirectory, StoreError};
use rollout_core::domain::{AccountId, ProjectId};

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

/// Local mirror of a project owned by the project service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Local mirror of an account owned by the account service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SqlProjectDirectory {
    pool: DbPool,
}

impl SqlProjectDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts the project or renames it when the id is already known.
    pub async fn register(
        &self,
        id: ProjectId,
        name: &str,
    ) -> Result<ProjectRecord, RepositoryError> {
        sqlx::query(
            "INSERT INTO project (id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(id.0)
        .bind(name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, name, created_at FROM project WHERE id = ?")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await?;
        project_from_row(&row)
    }

    pub async fn list(&self) -> Result<Vec<ProjectRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM project ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(project_from_row).collect()
    }

    async fn find_existing(
        &self,
        ids: &[ProjectId],
    ) -> Result<BTreeSet<ProjectId>, RepositoryError> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT id FROM project WHERE id IN (");
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(id.0);
        }
        query_builder.push(")");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<ProjectId, RepositoryError> { Ok(ProjectId(row.try_get("id")?)) })
            .collect()
    }
}

#[async_trait]
impl ProjectDirectory for SqlProjectDirectory {
    async fn projects_exist(&self, ids: &[ProjectId]) -> Result<BTreeSet<ProjectId>, StoreError> {
        Ok(self.find_existing(ids).await?)
    }
}

#[derive(Clone)]
pub struct SqlAccountDirectory {
    pool: DbPool,
}

impl SqlAccountDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn register(
        &self,
        id: &AccountId,
        display_name: &str,
    ) -> Result<AccountRecord, RepositoryError> {
        sqlx::query(
            "INSERT INTO account (id, display_name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
        )
        .bind(&id.0)
        .bind(display_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, display_name, created_at FROM account WHERE id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;
        account_from_row(&row)
    }

    pub async fn list(&self) -> Result<Vec<AccountRecord>, RepositoryError> {
        let rows =
            sqlx::query("SELECT id, display_name, created_at FROM account ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(account_from_row).collect()
    }
}

#[async_trait]
impl AccountDirectory for SqlAccountDirectory {
    async fn account_exists(&self, id: &AccountId) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(count > 0)
    }
}

fn project_from_row(row: &SqliteRow) -> Result<ProjectRecord, RepositoryError> {
    Ok(ProjectRecord {
        id: ProjectId(row.try_get("id")?),
        name: row.try_get("name")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn account_from_row(row: &SqliteRow) -> Result<AccountRecord, RepositoryError> {
    Ok(AccountRecord {
        id: AccountId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
