//! In-memory task store
//!
//! Tasks live in a sharded [`DashMap`], so updates to different tasks never
//! contend on one lock while each single-task update stays atomic.

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::A2aError;
use crate::protocol::{Artifact, Task, TaskSendParams, TaskState, TaskStatus};

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: DashMap<String, Task>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the task in `submitted` state, or append the message to an existing one
    pub fn upsert(&self, params: &TaskSendParams) -> Task {
        let mut entry = self.tasks.entry(params.id.clone()).or_insert_with(|| {
            debug!("Creating task {}", params.id);
            Task {
                id: params.id.clone(),
                session_id: Some(params.session_id.clone()),
                status: TaskStatus::new(TaskState::Submitted, None),
                artifacts: None,
                history: Some(Vec::new()),
                metadata: params.metadata.clone(),
            }
        });
        entry
            .history
            .get_or_insert_with(Vec::new)
            .push(params.message.clone());
        entry.clone()
    }

    /// Replace the status and append any artifacts
    pub fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        artifacts: Option<Vec<Artifact>>,
    ) -> Result<Task, A2aError> {
        let Some(mut task) = self.tasks.get_mut(id) else {
            warn!("Task {} not found for update", id);
            return Err(A2aError::TaskNotFound(id.to_string()));
        };
        debug!("Task {} -> {}", id, status.state);
        task.status = status;
        if let Some(artifacts) = artifacts {
            task.artifacts.get_or_insert_with(Vec::new).extend(artifacts);
        }
        Ok(task.clone())
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|t| t.value().clone())
    }

    /// Task with its history cut to the last `history_length` messages
    /// (none when unset or zero)
    pub fn get_with_history(&self, id: &str, history_length: Option<usize>) -> Result<Task, A2aError> {
        let mut task = self
            .get(id)
            .ok_or_else(|| A2aError::TaskNotFound(id.to_string()))?;
        let history = task.history.take().unwrap_or_default();
        task.history = Some(match history_length {
            Some(n) if n > 0 => {
                let skip = history.len().saturating_sub(n);
                history.into_iter().skip(skip).collect()
            }
            _ => Vec::new(),
        });
        Ok(task)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
