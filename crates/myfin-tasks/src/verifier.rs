use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use myfin_core::catalog::TaskSpec;
use myfin_core::error::MyfinError;
use myfin_core::types::{TaskId, TimestampMs};
use myfin_state::completions::CompletionFlags;
use myfin_state::db::{keys, StagedWrites, StateDb};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Where a task stands in the dwell protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TaskState {
    NotStarted,
    /// Link opened; waiting for the page to lose visibility.
    Armed,
    /// Page went hidden at `since_ms`; resolved on the next visible event.
    Away { since_ms: TimestampMs },
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TriggerOutcome {
    /// No dwell configured; completed on the spot.
    Completed { url: String },
    Armed { url: String, dwell_secs: u32 },
    AlreadyCompleted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TaskResolution {
    Completed { task: TaskId },
    /// Came back too early. The task returns to `NotStarted` and may be
    /// triggered again.
    Failed { task: TaskId, elapsed_ms: i64, required_ms: i64 },
}

/// Confirms that the user stayed on an external link for a task's dwell
/// time, using page visibility as the only signal.
///
/// At most one task is armed (`tasks.armed`). Hiding the page moves the
/// armed task into `tasks.started` with the hide timestamp; showing it again
/// resolves and clears every started entry. Completions land in
/// `tasks.completed` in the same batch that clears `tasks.started`.
pub struct TaskVerifier {
    db: Arc<StateDb>,
    tasks: Vec<TaskSpec>,
    completions: CompletionFlags,
}

impl TaskVerifier {
    pub fn new(db: Arc<StateDb>, tasks: Vec<TaskSpec>) -> Self {
        let completions = CompletionFlags::new(db.clone());
        Self { db, tasks, completions }
    }

    pub fn catalog(&self) -> &[TaskSpec] {
        &self.tasks
    }

    fn find(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn armed(&self) -> Result<Option<TaskId>, MyfinError> {
        self.db.user()?.get(keys::TASKS_ARMED)
    }

    pub fn started(&self) -> Result<BTreeMap<TaskId, TimestampMs>, MyfinError> {
        self.db.user()?.get_or_default(keys::TASKS_STARTED)
    }

    /// User opened the task's link.
    pub fn trigger(&self, id: &TaskId, now: DateTime<Utc>) -> Result<TriggerOutcome, MyfinError> {
        let task = self
            .find(id)
            .ok_or_else(|| MyfinError::UnknownTask(id.to_string()))?;
        if self.completions.is_completed(id)? {
            return Ok(TriggerOutcome::AlreadyCompleted);
        }

        let mut staged = StagedWrites::new();
        let outcome = match task.dwell_secs {
            None => {
                self.completions.stage_completed(&mut staged, std::slice::from_ref(id))?;
                info!(task = %id, "task completed instantly");
                TriggerOutcome::Completed { url: task.url.clone() }
            }
            Some(dwell_secs) => {
                if let Some(stale) = self.armed()? {
                    if &stale != id {
                        debug!(task = %id, %stale, "replacing stale armed task");
                    }
                }
                staged.put(keys::TASKS_ARMED, id)?;
                info!(task = %id, dwell_secs, at = now.timestamp_millis(), "task armed");
                TriggerOutcome::Armed { url: task.url.clone(), dwell_secs }
            }
        };
        self.db.user()?.commit(staged)?;
        Ok(outcome)
    }

    /// Page lost visibility. Starts the clock for the armed task, if any.
    pub fn on_hidden(&self, now: DateTime<Utc>) -> Result<Option<TaskId>, MyfinError> {
        let Some(id) = self.armed()? else {
            return Ok(None);
        };
        let mut started = self.started()?;
        started.insert(id.clone(), now.timestamp_millis());

        let mut staged = StagedWrites::new();
        staged.put(keys::TASKS_STARTED, &started)?;
        staged.remove(keys::TASKS_ARMED);
        self.db.user()?.commit(staged)?;
        debug!(task = %id, "dwell clock started");
        Ok(Some(id))
    }

    /// Page visible again. Resolves every task whose clock is running.
    pub fn on_visible(&self, now: DateTime<Utc>) -> Result<Vec<TaskResolution>, MyfinError> {
        let started = self.started()?;
        if started.is_empty() {
            return Ok(Vec::new());
        }
        let now_ms = now.timestamp_millis();

        let mut resolutions = Vec::with_capacity(started.len());
        let mut completed = Vec::new();
        for (task, since) in started {
            let Some(required_ms) = self.find(&task).map(|s| s.dwell_ms().unwrap_or(0)) else {
                warn!(task = %task, "dropping start time for task not in catalog");
                continue;
            };
            let elapsed_ms = now_ms - since;
            if elapsed_ms >= required_ms {
                info!(task = %task, elapsed_ms, "task completed");
                completed.push(task.clone());
                resolutions.push(TaskResolution::Completed { task });
            } else {
                info!(task = %task, elapsed_ms, required_ms, "task failed, returned too early");
                resolutions.push(TaskResolution::Failed { task, elapsed_ms, required_ms });
            }
        }

        let mut staged = StagedWrites::new();
        if !completed.is_empty() {
            self.completions.stage_completed(&mut staged, &completed)?;
        }
        staged.remove(keys::TASKS_STARTED);
        self.db.user()?.commit(staged)?;
        Ok(resolutions)
    }

    pub fn state(&self, id: &TaskId) -> Result<TaskState, MyfinError> {
        if self.completions.is_completed(id)? {
            return Ok(TaskState::Completed);
        }
        if let Some(since_ms) = self.started()?.get(id) {
            return Ok(TaskState::Away { since_ms: *since_ms });
        }
        if self.armed()?.as_ref() == Some(id) {
            return Ok(TaskState::Armed);
        }
        Ok(TaskState::NotStarted)
    }

    pub fn remaining(&self) -> Result<Vec<TaskId>, MyfinError> {
        self.completions.remaining(self.tasks.iter().map(|t| &t.id))
    }

    pub fn all_completed(&self) -> Result<bool, MyfinError> {
        Ok(self.remaining()?.is_empty())
    }
}
