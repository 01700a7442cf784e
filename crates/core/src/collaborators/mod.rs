//! Narrow contracts the workflow consumes from the rest of the system.
//!
//! Project and account data belong to other services; documents and bans are persisted by
//! whatever store implements these traits. The only hard requirement on a store is that
//! `DocumentStore::save_document` is an atomic compare-and-swap on the document version.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    AccountId, ApprovalDocument, BanId, BanPeriod, DocumentId, ProjectId, ScheduleWindow,
    ScheduledWindow,
};

pub mod memory;

pub use memory::{
    InMemoryAccountDirectory, InMemoryBanStore, InMemoryDocumentStore, InMemoryProjectDirectory,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("document `{document_id}` is at version {actual}, expected {expected}")]
    VersionConflict { document_id: DocumentId, expected: u32, actual: u32 },
    #[error("record `{0}` already exists")]
    Duplicate(String),
    #[error("record `{0}` does not exist")]
    Missing(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Subset of `ids` that resolve to a known project.
    async fn projects_exist(&self, ids: &[ProjectId]) -> Result<BTreeSet<ProjectId>, StoreError>;

    async fn project_exists(&self, id: ProjectId) -> Result<bool, StoreError> {
        Ok(self.projects_exist(&[id]).await?.contains(&id))
    }
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn account_exists(&self, id: &AccountId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_document(&self, id: &DocumentId)
        -> Result<Option<ApprovalDocument>, StoreError>;

    /// Stores a new document together with its lines.
    async fn insert_document(&self, document: ApprovalDocument) -> Result<(), StoreError>;

    /// Replaces the stored document only while its version still equals `expected_version`.
    async fn save_document(
        &self,
        document: ApprovalDocument,
        expected_version: u32,
    ) -> Result<(), StoreError>;

    /// Windows held by live deployment-type documents on any of `project_ids`.
    ///
    /// May return a superset; callers filter by overlap and status.
    async fn list_scheduled_windows(
        &self,
        project_ids: &BTreeSet<ProjectId>,
    ) -> Result<Vec<ScheduledWindow>, StoreError>;
}

#[async_trait]
pub trait BanStore: Send + Sync {
    async fn insert_ban(&self, ban: BanPeriod) -> Result<(), StoreError>;

    async fn load_ban(&self, id: &BanId) -> Result<Option<BanPeriod>, StoreError>;

    async fn save_ban(&self, ban: BanPeriod) -> Result<(), StoreError>;

    async fn list_bans(&self, include_deleted: bool) -> Result<Vec<BanPeriod>, StoreError>;

    /// Candidate bans for `project_ids` around `window`. May return a superset.
    async fn list_active_bans(
        &self,
        project_ids: &BTreeSet<ProjectId>,
        window: &ScheduleWindow,
    ) -> Result<Vec<BanPeriod>, StoreError>;
}
