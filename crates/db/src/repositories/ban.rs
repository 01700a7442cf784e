use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use rollout_core::collaborators::{BanStore, StoreError};
use rollout_core::domain::{AccountId, BanId, BanPeriod, BanType, ProjectId, ScheduleWindow};

use super::{
    format_date, format_local, format_time, parse_date, parse_enum, parse_optional_timestamp,
    parse_time, parse_timestamp, RepositoryError,
};
use crate::DbPool;

const BAN_COLUMNS: &str = "b.id, b.title, b.ban_type, b.start_date, b.start_time, b.end_date, \
     b.end_time, b.created_by, b.deleted, b.deleted_at, b.created_at";

#[derive(Clone)]
pub struct SqlBanStore {
    pool: DbPool,
}

impl SqlBanStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, ban: &BanPeriod) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO ban_period (
                id, title, ban_type, start_date, start_time, end_date, end_time,
                starts_at, ends_at, created_by, deleted, deleted_at, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ban.id.0)
        .bind(&ban.title)
        .bind(ban.ban_type.as_str())
        .bind(format_date(ban.start_date))
        .bind(format_time(ban.start_time))
        .bind(format_date(ban.end_date))
        .bind(format_time(ban.end_time))
        .bind(format_local(ban.starts_at()))
        .bind(format_local(ban.ends_at()))
        .bind(&ban.created_by.0)
        .bind(ban.deleted)
        .bind(ban.deleted_at.map(|deleted_at| deleted_at.to_rfc3339()))
        .bind(ban.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for project_id in &ban.project_ids {
            sqlx::query("INSERT INTO ban_period_project (ban_id, project_id) VALUES (?, ?)")
                .bind(&ban.id.0)
                .bind(project_id.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Only the soft-delete columns change after creation.
    async fn update(&self, ban: &BanPeriod) -> Result<bool, RepositoryError> {
        let updated = sqlx::query("UPDATE ban_period SET deleted = ?, deleted_at = ? WHERE id = ?")
            .bind(ban.deleted)
            .bind(ban.deleted_at.map(|deleted_at| deleted_at.to_rfc3339()))
            .bind(&ban.id.0)
            .execute(&self.pool)
            .await?;
        Ok(updated.rows_affected() > 0)
    }

    async fn find(&self, id: &BanId) -> Result<Option<BanPeriod>, RepositoryError> {
        let query = format!("SELECT {BAN_COLUMNS} FROM ban_period b WHERE b.id = ?");
        let rows = sqlx::query(&query).bind(&id.0).fetch_all(&self.pool).await?;
        Ok(self.hydrate(rows).await?.pop())
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<BanPeriod>, RepositoryError> {
        let filter = if include_deleted { "" } else { " WHERE b.deleted = 0" };
        let query = format!(
            "SELECT {BAN_COLUMNS} FROM ban_period b{filter} ORDER BY b.starts_at ASC, b.id ASC"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn list_active(
        &self,
        project_ids: &BTreeSet<ProjectId>,
        window: &ScheduleWindow,
    ) -> Result<Vec<BanPeriod>, RepositoryError> {
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT DISTINCT {BAN_COLUMNS}, b.starts_at
             FROM ban_period b
             JOIN ban_period_project p ON p.ban_id = b.id
             WHERE b.deleted = 0 AND b.starts_at < "
        ));
        query_builder.push_bind(format_local(window.end));
        query_builder.push(" AND b.ends_at > ");
        query_builder.push_bind(format_local(window.start));
        query_builder.push(" AND p.project_id IN (");
        let mut separated = query_builder.separated(", ");
        for project_id in project_ids {
            separated.push_bind(project_id.0);
        }
        query_builder.push(") ORDER BY b.starts_at ASC, b.id ASC");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<BanPeriod>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ban_ids =
            rows.iter().map(|row| row.try_get::<String, _>("id")).collect::<Result<Vec<_>, _>>()?;
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT ban_id, project_id FROM ban_period_project WHERE ban_id IN (",
        );
        let mut separated = query_builder.separated(", ");
        for ban_id in &ban_ids {
            separated.push_bind(ban_id.as_str());
        }
        query_builder.push(")");

        let mut projects: BTreeMap<String, BTreeSet<ProjectId>> = BTreeMap::new();
        for row in query_builder.build().fetch_all(&self.pool).await? {
            let ban_id: String = row.try_get("ban_id")?;
            let project_id: i64 = row.try_get("project_id")?;
            projects.entry(ban_id).or_default().insert(ProjectId(project_id));
        }

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let project_ids = projects.remove(&id).unwrap_or_default();
                ban_from_row(row, project_ids)
            })
            .collect()
    }
}

#[async_trait]
impl BanStore for SqlBanStore {
    async fn insert_ban(&self, ban: BanPeriod) -> Result<(), StoreError> {
        Ok(self.insert(&ban).await?)
    }

    async fn load_ban(&self, id: &BanId) -> Result<Option<BanPeriod>, StoreError> {
        Ok(self.find(id).await?)
    }

    async fn save_ban(&self, ban: BanPeriod) -> Result<(), StoreError> {
        if self.update(&ban).await? {
            Ok(())
        } else {
            Err(StoreError::Missing(ban.id.0))
        }
    }

    async fn list_bans(&self, include_deleted: bool) -> Result<Vec<BanPeriod>, StoreError> {
        Ok(self.list(include_deleted).await?)
    }

    async fn list_active_bans(
        &self,
        project_ids: &BTreeSet<ProjectId>,
        window: &ScheduleWindow,
    ) -> Result<Vec<BanPeriod>, StoreError> {
        Ok(self.list_active(project_ids, window).await?)
    }
}

fn ban_from_row(
    row: &SqliteRow,
    project_ids: BTreeSet<ProjectId>,
) -> Result<BanPeriod, RepositoryError> {
    Ok(BanPeriod {
        id: BanId(row.try_get("id")?),
        title: row.try_get("title")?,
        ban_type: parse_enum("ban_type", row.try_get("ban_type")?, BanType::parse)?,
        start_date: parse_date("start_date", row.try_get("start_date")?)?,
        start_time: parse_time("start_time", row.try_get("start_time")?)?,
        end_date: parse_date("end_date", row.try_get("end_date")?)?,
        end_time: parse_time("end_time", row.try_get("end_time")?)?,
        project_ids,
        created_by: AccountId(row.try_get("created_by")?),
        deleted: row.try_get("deleted")?,
        deleted_at: parse_optional_timestamp("deleted_at", row.try_get("deleted_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    use rollout_core::collaborators::{BanStore, StoreError};
    use rollout_core::domain::{AccountId, BanId, BanPeriod, BanType, ProjectId, ScheduleWindow};

    use super::SqlBanStore;
    use crate::repositories::SqlProjectDirectory;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let projects = SqlProjectDirectory::new(pool.clone());
        for (id, name) in [(7, "payments-api"), (8, "ledger")] {
            projects.register(ProjectId(id), name).await.expect("register project");
        }
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn window(start: &str, end: &str) -> ScheduleWindow {
        let parse = |value: &str| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid timestamp")
        };
        ScheduleWindow::new(parse(start), parse(end)).expect("valid window")
    }

    fn night_ban(id: &str, day: u32, projects: &[i64]) -> BanPeriod {
        BanPeriod {
            id: BanId(id.to_owned()),
            title: "DB failover drill".to_owned(),
            ban_type: BanType::RegularMaintenance,
            start_date: NaiveDate::from_ymd_opt(2024, 6, day).expect("date"),
            start_time: NaiveTime::from_hms_opt(22, 0, 0).expect("time"),
            end_date: NaiveDate::from_ymd_opt(2024, 6, day + 1).expect("date"),
            end_time: NaiveTime::from_hms_opt(2, 0, 0).expect("time"),
            project_ids: projects.iter().copied().map(ProjectId).collect(),
            created_by: AccountId::from("scheduler"),
            deleted: false,
            deleted_at: None,
            created_at: parse_ts("2024-05-20T09:00:00Z"),
        }
    }

    #[tokio::test]
    async fn insert_load_and_soft_delete_round_trip() {
        let pool = setup_pool().await;
        let store = SqlBanStore::new(pool.clone());
        let ban = night_ban("BAN-1", 1, &[7, 8]);

        store.insert_ban(ban.clone()).await.expect("insert");
        assert_eq!(store.load_ban(&ban.id).await.expect("load"), Some(ban.clone()));

        let mut deleted = ban.clone();
        deleted.deleted = true;
        deleted.deleted_at = Some(parse_ts("2024-05-21T08:00:00Z"));
        store.save_ban(deleted.clone()).await.expect("soft delete");

        assert_eq!(store.load_ban(&ban.id).await.expect("load"), Some(deleted));
        assert!(store.list_bans(false).await.expect("list active").is_empty());
        assert_eq!(store.list_bans(true).await.expect("list all").len(), 1);

        let error = store.save_ban(night_ban("BAN-ghost", 1, &[7])).await.expect_err("missing");
        assert!(matches!(error, StoreError::Missing(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn active_bans_are_filtered_by_window_and_project() {
        let pool = setup_pool().await;
        let store = SqlBanStore::new(pool.clone());

        store.insert_ban(night_ban("BAN-b", 1, &[7])).await.expect("insert b");
        store.insert_ban(night_ban("BAN-a", 1, &[7, 8])).await.expect("insert a");
        store.insert_ban(night_ban("BAN-later", 5, &[7])).await.expect("insert later");
        store.insert_ban(night_ban("BAN-other", 1, &[8])).await.expect("insert other");

        let projects = BTreeSet::from([ProjectId(7)]);
        let active = store
            .list_active_bans(&projects, &window("2024-06-01 23:00", "2024-06-02 00:30"))
            .await
            .expect("list active");
        assert_eq!(active.iter().map(|ban| ban.id.0.as_str()).collect::<Vec<_>>(), vec![
            "BAN-a", "BAN-b"
        ]);
        assert_eq!(active[0].project_ids, BTreeSet::from([ProjectId(7), ProjectId(8)]));

        let touching = store
            .list_active_bans(&projects, &window("2024-06-02 02:00", "2024-06-02 03:00"))
            .await
            .expect("list touching");
        assert!(touching.is_empty());

        pool.close().await;
    }
}
