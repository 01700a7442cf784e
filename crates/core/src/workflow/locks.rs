use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::ProjectId;

/// Per-project async locks held across "check window, then commit".
///
/// Locks are always taken in ascending project id order so two callers with overlapping
/// project sets cannot deadlock. Slots are never evicted, so the map holds one entry per
/// project ever locked.
#[derive(Clone, Default)]
pub struct ProjectLocks {
    slots: Arc<Mutex<HashMap<ProjectId, Arc<AsyncMutex<()>>>>>,
}

/// Releases every held project lock when dropped.
pub struct ProjectGuard {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl ProjectGuard {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl ProjectLocks {
    pub async fn acquire(&self, project_ids: &BTreeSet<ProjectId>) -> ProjectGuard {
        let mut guards = Vec::with_capacity(project_ids.len());
        for project_id in project_ids {
            let slot = self.slot(*project_id);
            guards.push(slot.lock_owned().await);
        }
        ProjectGuard { guards }
    }

    fn slot(&self, project_id: ProjectId) -> Arc<AsyncMutex<()>> {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(slots.entry(project_id).or_default())
    }
}
