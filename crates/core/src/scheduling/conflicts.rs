use std::collections::BTreeSet;

use crate::collaborators::{BanStore, DocumentStore, ProjectDirectory};
use crate::domain::{DocumentId, ProjectId, ScheduleWindow, ScheduledWindow};
use crate::errors::{ApplicationError, ValidationError};
use crate::scheduling::bans::BanRegistry;
use crate::scheduling::{ScheduleConflict, WindowCheck};

/// Decides whether a proposed window is legal. Read-only.
///
/// Ban overlaps are reported before deployment overlaps; a window that hits both is a
/// ban conflict.
pub struct ConflictChecker<'a, B, P, D> {
    bans: &'a BanRegistry<B, P>,
    documents: &'a D,
}

impl<'a, B, P, D> ConflictChecker<'a, B, P, D>
where
    B: BanStore,
    P: ProjectDirectory,
    D: DocumentStore,
{
    pub fn new(bans: &'a BanRegistry<B, P>, documents: &'a D) -> Self {
        Self { bans, documents }
    }

    pub async fn check_window(
        &self,
        project_ids: &BTreeSet<ProjectId>,
        window: &ScheduleWindow,
        exclude_document_id: Option<&DocumentId>,
    ) -> Result<WindowCheck, ApplicationError> {
        if project_ids.is_empty() {
            return Err(ValidationError::EmptyProjectSet.into());
        }
        window.validate()?;

        let bans = self.bans.list_active(project_ids, window).await?;
        if !bans.is_empty() {
            return Ok(WindowCheck::Conflict(ScheduleConflict::BanOverlap(bans)));
        }

        let mut overlapping: Vec<ScheduledWindow> = self
            .documents
            .list_scheduled_windows(project_ids)
            .await?
            .into_iter()
            .filter(|scheduled| Some(&scheduled.document_id) != exclude_document_id)
            .filter(|scheduled| scheduled.document_type.occupies_schedule())
            .filter(ScheduledWindow::blocks_schedule)
            .filter(|scheduled| scheduled.shares_project_with(project_ids))
            .filter(|scheduled| scheduled.window.overlaps(window))
            .collect();

        if overlapping.is_empty() {
            return Ok(WindowCheck::Accept);
        }

        overlapping.sort_by(|left, right| {
            left.window
                .start
                .cmp(&right.window.start)
                .then_with(|| left.document_id.cmp(&right.document_id))
        });
        Ok(WindowCheck::Conflict(ScheduleConflict::DeploymentOverlap(overlapping)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};

    use super::ConflictChecker;
    use crate::collaborators::{
        DocumentStore, InMemoryBanStore, InMemoryDocumentStore, InMemoryProjectDirectory,
    };
    use crate::domain::{
        AccountId, ApprovalDocument, BanType, DocumentId, DocumentStatus, DocumentType,
        NewBanPeriod, ProjectId, ScheduleWindow,
    };
    use crate::errors::ErrorKind;
    use crate::scheduling::{BanRegistry, ConflictReason, WindowCheck};

    type Registry = BanRegistry<InMemoryBanStore, InMemoryProjectDirectory>;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid timestamp")
    }

    fn window(start: &str, end: &str) -> ScheduleWindow {
        ScheduleWindow::new(at(start), at(end)).expect("valid window")
    }

    fn registry() -> Registry {
        BanRegistry::new(
            Arc::new(InMemoryBanStore::default()),
            Arc::new(InMemoryProjectDirectory::with_projects([7, 8])),
        )
    }

    async fn add_night_ban(registry: &Registry) {
        registry
            .create(
                &AccountId::from("scheduler"),
                NewBanPeriod {
                    title: "Network maintenance".to_owned(),
                    ban_type: BanType::RegularMaintenance,
                    start_date: NaiveDate::from_ymd_opt(2024, 6, 1).expect("date"),
                    start_time: NaiveTime::from_hms_opt(22, 0, 0).expect("time"),
                    end_date: NaiveDate::from_ymd_opt(2024, 6, 2).expect("date"),
                    end_time: NaiveTime::from_hms_opt(2, 0, 0).expect("time"),
                    related_project_ids: vec![ProjectId(7)],
                },
            )
            .await
            .expect("create ban");
    }

    async fn add_deployment(
        store: &InMemoryDocumentStore,
        id: &str,
        status: DocumentStatus,
        scheduled: ScheduleWindow,
    ) {
        store
            .insert_document(ApprovalDocument {
                id: DocumentId(id.to_owned()),
                deployment_id: None,
                drafter_id: AccountId::from("alice"),
                document_type: DocumentType::Deployment,
                status,
                title: format!("Release {id}"),
                content: String::new(),
                project_ids: BTreeSet::from([ProjectId(7)]),
                schedule: Some(scheduled),
                lines: Vec::new(),
                version: 1,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .expect("insert document");
    }

    #[tokio::test]
    async fn ban_overlap_is_reported_for_affected_project_only() {
        let registry = registry();
        add_night_ban(&registry).await;
        let store = InMemoryDocumentStore::default();
        let checker = ConflictChecker::new(&registry, &store);
        let proposed = window("2024-06-01 23:00", "2024-06-02 00:30");

        let result = checker
            .check_window(&BTreeSet::from([ProjectId(7)]), &proposed, None)
            .await
            .expect("check window");
        let conflict = result.conflict().expect("ban conflict");
        assert_eq!(conflict.reason(), ConflictReason::BanOverlap);
        assert_eq!(conflict.entry_ids().len(), 1);

        let result = checker
            .check_window(&BTreeSet::from([ProjectId(8)]), &proposed, None)
            .await
            .expect("check window");
        assert_eq!(result, WindowCheck::Accept);

        let result = checker
            .check_window(
                &BTreeSet::from([ProjectId(7)]),
                &window("2024-06-02 02:00", "2024-06-02 03:00"),
                None,
            )
            .await
            .expect("check window");
        assert!(result.is_accept());
    }

    #[tokio::test]
    async fn ban_conflict_wins_over_deployment_conflict() {
        let registry = registry();
        add_night_ban(&registry).await;
        let store = InMemoryDocumentStore::default();
        add_deployment(
            &store,
            "DOC-1",
            DocumentStatus::Approved,
            window("2024-06-01 21:00", "2024-06-01 23:30"),
        )
        .await;

        let result = ConflictChecker::new(&registry, &store)
            .check_window(
                &BTreeSet::from([ProjectId(7)]),
                &window("2024-06-01 23:00", "2024-06-02 00:30"),
                None,
            )
            .await
            .expect("check window");

        assert_eq!(result.conflict().map(|c| c.reason()), Some(ConflictReason::BanOverlap));
    }

    #[tokio::test]
    async fn deployment_overlap_ignores_excluded_and_settled_documents() {
        let registry = registry();
        let store = InMemoryDocumentStore::default();
        let slot = window("2024-06-03 10:00", "2024-06-03 12:00");
        add_deployment(&store, "DOC-B", DocumentStatus::Pending, slot).await;
        add_deployment(&store, "DOC-A", DocumentStatus::Requested, slot).await;
        add_deployment(&store, "DOC-C", DocumentStatus::Draft, slot).await;
        add_deployment(&store, "DOC-D", DocumentStatus::Canceled, slot).await;
        let checker = ConflictChecker::new(&registry, &store);
        let projects = BTreeSet::from([ProjectId(7)]);
        let proposed = window("2024-06-03 11:00", "2024-06-03 13:00");

        let result = checker.check_window(&projects, &proposed, None).await.expect("check");
        let conflict = result.conflict().expect("deployment conflict");
        assert_eq!(conflict.reason(), ConflictReason::DeploymentOverlap);
        assert_eq!(conflict.entry_ids(), vec!["DOC-A".to_owned(), "DOC-B".to_owned()]);

        let excluded = DocumentId("DOC-A".to_owned());
        let result =
            checker.check_window(&projects, &proposed, Some(&excluded)).await.expect("check");
        assert_eq!(result.conflict().map(|c| c.entry_ids()), Some(vec!["DOC-B".to_owned()]));

        let result = checker
            .check_window(&projects, &window("2024-06-03 12:00", "2024-06-03 13:00"), None)
            .await
            .expect("check");
        assert!(result.is_accept());
    }

    #[tokio::test]
    async fn empty_project_set_is_rejected_before_lookup() {
        let registry = registry();
        let store = InMemoryDocumentStore::default();

        let error = ConflictChecker::new(&registry, &store)
            .check_window(&BTreeSet::new(), &window("2024-06-03 10:00", "2024-06-03 12:00"), None)
            .await
            .expect_err("empty project set");

        assert_eq!(error.kind(), Some(ErrorKind::Validation));
    }
}
