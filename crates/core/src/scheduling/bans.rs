use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::collaborators::{BanStore, ProjectDirectory};
use crate::domain::{AccountId, BanId, BanPeriod, NewBanPeriod, ProjectId, ScheduleWindow};
use crate::errors::{ApplicationError, EntityKind, ValidationError, WorkflowError};

/// Maintenance windows and the question "is this project blocked during this window?".
pub struct BanRegistry<B, P> {
    bans: Arc<B>,
    projects: Arc<P>,
}

impl<B, P> Clone for BanRegistry<B, P> {
    fn clone(&self) -> Self {
        Self { bans: Arc::clone(&self.bans), projects: Arc::clone(&self.projects) }
    }
}

impl<B, P> BanRegistry<B, P>
where
    B: BanStore,
    P: ProjectDirectory,
{
    pub fn new(bans: Arc<B>, projects: Arc<P>) -> Self {
        Self { bans, projects }
    }

    /// Non-deleted bans overlapping `window` on any of `project_ids`, earliest first.
    pub async fn list_active(
        &self,
        project_ids: &BTreeSet<ProjectId>,
        window: &ScheduleWindow,
    ) -> Result<Vec<BanPeriod>, ApplicationError> {
        let mut bans: Vec<BanPeriod> = self
            .bans
            .list_active_bans(project_ids, window)
            .await?
            .into_iter()
            .filter(|ban| ban.blocks(project_ids, window))
            .collect();
        bans.sort_by(|left, right| {
            left.starts_at().cmp(&right.starts_at()).then_with(|| left.id.cmp(&right.id))
        });
        Ok(bans)
    }

    pub async fn create(
        &self,
        actor: &AccountId,
        request: NewBanPeriod,
    ) -> Result<BanPeriod, ApplicationError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(ValidationError::BlankField { field: "title" }.into());
        }

        ScheduleWindow::new(request.starts_at(), request.ends_at())?;

        if request.related_project_ids.is_empty() {
            return Err(ValidationError::EmptyProjectSet.into());
        }

        let mut project_ids = BTreeSet::new();
        for project_id in &request.related_project_ids {
            if !project_ids.insert(*project_id) {
                return Err(ValidationError::DuplicateProject(*project_id).into());
            }
        }

        let known = self.projects.projects_exist(&request.related_project_ids).await?;
        if let Some(unknown) = project_ids.iter().find(|id| !known.contains(id)) {
            return Err(ValidationError::UnknownProject(*unknown).into());
        }

        let ban = BanPeriod {
            id: BanId(format!("BAN-{}", Uuid::new_v4())),
            title: title.to_owned(),
            ban_type: request.ban_type,
            start_date: request.start_date,
            start_time: request.start_time,
            end_date: request.end_date,
            end_time: request.end_time,
            project_ids,
            created_by: actor.clone(),
            deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
        };
        self.bans.insert_ban(ban.clone()).await?;

        Ok(ban)
    }

    /// Marks the ban deleted. Already-deleted bans are returned unchanged.
    pub async fn soft_delete(&self, ban_id: &BanId) -> Result<BanPeriod, ApplicationError> {
        let mut ban = self.get(ban_id).await?;
        if ban.deleted {
            return Ok(ban);
        }

        ban.deleted = true;
        ban.deleted_at = Some(Utc::now());
        self.bans.save_ban(ban.clone()).await?;
        Ok(ban)
    }

    pub async fn get(&self, ban_id: &BanId) -> Result<BanPeriod, ApplicationError> {
        self.bans
            .load_ban(ban_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(EntityKind::Ban, &ban_id.0).into())
    }

    pub async fn list(&self, include_deleted: bool) -> Result<Vec<BanPeriod>, ApplicationError> {
        let mut bans = self.bans.list_bans(include_deleted).await?;
        bans.sort_by(|left, right| {
            left.starts_at().cmp(&right.starts_at()).then_with(|| left.id.cmp(&right.id))
        });
        Ok(bans)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    use super::BanRegistry;
    use crate::collaborators::{InMemoryBanStore, InMemoryProjectDirectory};
    use crate::domain::{AccountId, BanType, NewBanPeriod, ProjectId, ScheduleWindow};
    use crate::errors::{ErrorKind, ValidationError, WorkflowError};

    fn registry() -> BanRegistry<InMemoryBanStore, InMemoryProjectDirectory> {
        BanRegistry::new(
            Arc::new(InMemoryBanStore::default()),
            Arc::new(InMemoryProjectDirectory::with_projects([7, 8])),
        )
    }

    fn request(start: (u32, u32), end: (u32, u32), projects: &[i64]) -> NewBanPeriod {
        NewBanPeriod {
            title: "Storage migration".to_owned(),
            ban_type: BanType::RegularMaintenance,
            start_date: NaiveDate::from_ymd_opt(2024, 6, start.0).expect("date"),
            start_time: NaiveTime::from_hms_opt(start.1, 0, 0).expect("time"),
            end_date: NaiveDate::from_ymd_opt(2024, 6, end.0).expect("date"),
            end_time: NaiveTime::from_hms_opt(end.1, 0, 0).expect("time"),
            related_project_ids: projects.iter().copied().map(ProjectId).collect(),
        }
    }

    fn window(start: &str, end: &str) -> ScheduleWindow {
        let parse = |value: &str| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid timestamp")
        };
        ScheduleWindow::new(parse(start), parse(end)).expect("valid window")
    }

    #[tokio::test]
    async fn create_rejects_inverted_or_empty_requests() {
        let registry = registry();
        let actor = AccountId::from("scheduler");

        let error = registry
            .create(&actor, request((2, 2), (1, 22), &[7]))
            .await
            .expect_err("end before start");
        assert_eq!(error.kind(), Some(ErrorKind::Validation));

        let error = registry
            .create(&actor, request((1, 22), (1, 22), &[7]))
            .await
            .expect_err("zero-length interval");
        assert!(matches!(
            error.workflow(),
            Some(WorkflowError::Validation(ValidationError::InvertedWindow { .. }))
        ));

        let error =
            registry.create(&actor, request((1, 22), (2, 2), &[])).await.expect_err("no projects");
        assert_eq!(error.kind(), Some(ErrorKind::Validation));

        let error = registry
            .create(&actor, request((1, 22), (2, 2), &[7, 7]))
            .await
            .expect_err("duplicate projects");
        assert_eq!(error.kind(), Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn create_rejects_unknown_project() {
        let error = registry()
            .create(&AccountId::from("scheduler"), request((1, 22), (2, 2), &[7, 99]))
            .await
            .expect_err("unknown project");

        assert_eq!(error.kind(), Some(ErrorKind::Validation));
        assert!(matches!(
            error.workflow(),
            Some(WorkflowError::Validation(ValidationError::UnknownProject(ProjectId(99))))
        ));
    }

    #[tokio::test]
    async fn soft_deleted_bans_leave_active_listing_but_stay_retrievable() {
        let registry = registry();
        let ban = registry
            .create(&AccountId::from("scheduler"), request((1, 22), (2, 2), &[7]))
            .await
            .expect("create ban");
        let projects = BTreeSet::from([ProjectId(7)]);
        let overlapping = window("2024-06-01 23:00", "2024-06-02 00:30");

        let active = registry.list_active(&projects, &overlapping).await.expect("list active");
        assert_eq!(active.len(), 1);

        let deleted = registry.soft_delete(&ban.id).await.expect("soft delete");
        assert!(deleted.deleted);
        let again = registry.soft_delete(&ban.id).await.expect("idempotent delete");
        assert_eq!(again.deleted_at, deleted.deleted_at);

        assert!(registry.list_active(&projects, &overlapping).await.expect("list").is_empty());
        assert!(registry.get(&ban.id).await.expect("still stored").deleted);
        assert_eq!(registry.list(true).await.expect("list all").len(), 1);
        assert!(registry.list(false).await.expect("list live").is_empty());
    }
}
