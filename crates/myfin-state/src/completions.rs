use std::collections::BTreeMap;
use std::sync::Arc;

use myfin_core::error::MyfinError;
use myfin_core::types::TaskId;

use crate::db::{keys, StagedWrites, StateDb};

/// Per-task completion flags for the current day. Entries are only ever
/// added; the map is cleared as a whole on rollover.
#[derive(Clone)]
pub struct CompletionFlags {
    db: Arc<StateDb>,
}

impl CompletionFlags {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self { db }
    }

    pub fn completed(&self) -> Result<BTreeMap<TaskId, bool>, MyfinError> {
        self.db.user()?.get_or_default(keys::TASKS_COMPLETED)
    }

    pub fn is_completed(&self, id: &TaskId) -> Result<bool, MyfinError> {
        Ok(self.completed()?.get(id).copied().unwrap_or(false))
    }

    /// Catalog tasks not yet completed today, in catalog order.
    pub fn remaining<'a>(
        &self,
        catalog: impl IntoIterator<Item = &'a TaskId>,
    ) -> Result<Vec<TaskId>, MyfinError> {
        let done = self.completed()?;
        Ok(catalog
            .into_iter()
            .filter(|id| !done.get(*id).copied().unwrap_or(false))
            .cloned()
            .collect())
    }

    pub fn mark_completed(&self, id: &TaskId) -> Result<(), MyfinError> {
        let mut staged = StagedWrites::new();
        self.stage_completed(&mut staged, std::slice::from_ref(id))?;
        self.db.user()?.commit(staged)
    }

    pub fn stage_completed(&self, staged: &mut StagedWrites, ids: &[TaskId]) -> Result<(), MyfinError> {
        let mut done = self.completed()?;
        for id in ids {
            done.insert(id.clone(), true);
        }
        staged.put(keys::TASKS_COMPLETED, &done)
    }

    pub fn stage_clear(&self, staged: &mut StagedWrites) {
        staged.remove(keys::TASKS_COMPLETED);
    }
}
