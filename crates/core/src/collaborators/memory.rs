use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AccountDirectory, BanStore, DocumentStore, ProjectDirectory, StoreError};
use crate::domain::{
    AccountId, ApprovalDocument, BanId, BanPeriod, DocumentId, ProjectId, ScheduleWindow,
    ScheduledWindow,
};

#[derive(Default)]
pub struct InMemoryProjectDirectory {
    projects: RwLock<HashSet<ProjectId>>,
}

impl InMemoryProjectDirectory {
    pub fn with_projects(ids: impl IntoIterator<Item = i64>) -> Self {
        Self { projects: RwLock::new(ids.into_iter().map(ProjectId).collect()) }
    }

    pub async fn register(&self, id: ProjectId) {
        self.projects.write().await.insert(id);
    }
}

#[async_trait]
impl ProjectDirectory for InMemoryProjectDirectory {
    async fn projects_exist(&self, ids: &[ProjectId]) -> Result<BTreeSet<ProjectId>, StoreError> {
        let projects = self.projects.read().await;
        Ok(ids.iter().filter(|id| projects.contains(id)).copied().collect())
    }
}

#[derive(Default)]
pub struct InMemoryAccountDirectory {
    accounts: RwLock<HashSet<AccountId>>,
}

impl InMemoryAccountDirectory {
    pub fn with_accounts<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self { accounts: RwLock::new(ids.into_iter().map(AccountId::from).collect()) }
    }

    pub async fn register(&self, id: AccountId) {
        self.accounts.write().await.insert(id);
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn account_exists(&self, id: &AccountId) -> Result<bool, StoreError> {
        Ok(self.accounts.read().await.contains(id))
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, ApprovalDocument>>,
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load_document(
        &self,
        id: &DocumentId,
    ) -> Result<Option<ApprovalDocument>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.get(id).cloned())
    }

    async fn insert_document(&self, document: ApprovalDocument) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&document.id) {
            return Err(StoreError::Duplicate(document.id.0));
        }
        documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn save_document(
        &self,
        document: ApprovalDocument,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        let stored = documents
            .get_mut(&document.id)
            .ok_or_else(|| StoreError::Missing(document.id.0.clone()))?;

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                document_id: document.id.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        *stored = document;
        Ok(())
    }

    async fn list_scheduled_windows(
        &self,
        project_ids: &BTreeSet<ProjectId>,
    ) -> Result<Vec<ScheduledWindow>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .values()
            .filter_map(ApprovalDocument::scheduled_window)
            .filter(|scheduled| scheduled.shares_project_with(project_ids))
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryBanStore {
    bans: RwLock<BTreeMap<BanId, BanPeriod>>,
}

#[async_trait]
impl BanStore for InMemoryBanStore {
    async fn insert_ban(&self, ban: BanPeriod) -> Result<(), StoreError> {
        let mut bans = self.bans.write().await;
        if bans.contains_key(&ban.id) {
            return Err(StoreError::Duplicate(ban.id.0));
        }
        bans.insert(ban.id.clone(), ban);
        Ok(())
    }

    async fn load_ban(&self, id: &BanId) -> Result<Option<BanPeriod>, StoreError> {
        Ok(self.bans.read().await.get(id).cloned())
    }

    async fn save_ban(&self, ban: BanPeriod) -> Result<(), StoreError> {
        let mut bans = self.bans.write().await;
        let stored = bans.get_mut(&ban.id).ok_or_else(|| StoreError::Missing(ban.id.0.clone()))?;
        *stored = ban;
        Ok(())
    }

    async fn list_bans(&self, include_deleted: bool) -> Result<Vec<BanPeriod>, StoreError> {
        let bans = self.bans.read().await;
        Ok(bans.values().filter(|ban| include_deleted || ban.is_active()).cloned().collect())
    }

    async fn list_active_bans(
        &self,
        project_ids: &BTreeSet<ProjectId>,
        window: &ScheduleWindow,
    ) -> Result<Vec<BanPeriod>, StoreError> {
        let bans = self.bans.read().await;
        Ok(bans.values().filter(|ban| ban.blocks(project_ids, window)).cloned().collect())
    }
}
