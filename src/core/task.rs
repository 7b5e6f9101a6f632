//! Task manager - pending user tasks and their completion

use super::events::EngineEvent;
use super::form::Variables;
use super::ids::{DefinitionId, InstanceId, TaskId};
use super::instance::InstanceEngine;
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A user task created when an instance enters a user task step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Owning instance (back-reference)
    pub instance_id: InstanceId,
    pub definition_id: DefinitionId,
    /// Index of the step in the definition
    pub step_index: usize,
    pub name: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        instance_id: InstanceId,
        definition_id: DefinitionId,
        step_index: usize,
        name: String,
    ) -> Self {
        Self {
            id,
            instance_id,
            definition_id,
            step_index,
            name,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    fn mark_completed(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        now
    }
}

/// Queries and completes user tasks
pub struct TaskManager {
    instances: Arc<InstanceEngine>,
}

impl TaskManager {
    pub fn new(instances: Arc<InstanceEngine>) -> Self {
        Self { instances }
    }

    /// Pending tasks of an instance, in creation order
    pub fn list_pending(&self, instance_id: &InstanceId) -> EngineResult<Vec<Task>> {
        self.instances.with_slot(instance_id, |slot| {
            Ok(slot.tasks.iter().filter(|t| t.is_pending()).cloned().collect())
        })
    }

    /// Every task an instance has created, completed ones included
    pub fn history(&self, instance_id: &InstanceId) -> EngineResult<Vec<Task>> {
        self.instances
            .with_slot(instance_id, |slot| Ok(slot.tasks.clone()))
    }

    pub fn get(&self, task_id: &TaskId) -> EngineResult<Task> {
        let owner = self
            .instances
            .task_owner(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))?;

        self.instances.with_slot(&owner, |slot| {
            slot.tasks
                .iter()
                .find(|t| t.id == *task_id)
                .cloned()
                .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))
        })
    }

    /// Complete a task: merge its variables into the instance (last write
    /// wins per key), mark it completed and advance the instance.
    ///
    /// Runs entirely under the owning instance's lock. All checks happen
    /// before the first mutation, so a rejected call changes nothing.
    pub fn complete(&self, task_id: &TaskId, variables: Variables) -> EngineResult<()> {
        let owner = self.instances.task_owner(task_id).ok_or_else(|| {
            log::warn!("Rejected completion of unknown task {}", task_id);
            EngineError::TaskNotFound(task_id.clone())
        })?;

        self.instances.with_slot(&owner, |slot| {
            let index = slot
                .tasks
                .iter()
                .position(|t| t.id == *task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))?;

            if slot.tasks[index].status == TaskStatus::Completed {
                log::warn!("Task {} was already completed", task_id);
                return Err(EngineError::AlreadyCompleted(task_id.clone()));
            }
            if slot.instance.ended {
                return Err(EngineError::InstanceEnded(slot.instance.id.clone()));
            }

            for (key, value) in &variables {
                if let Some(previous) = slot.instance.variables.get(key) {
                    if previous != value {
                        log::debug!("Variable {} overwritten by task {}", key, task_id);
                    }
                }
            }
            slot.instance.variables.extend(variables.clone());
            let completed_at = slot.tasks[index].mark_completed();

            log::info!(
                "Completed task {} [{}] with {} variable(s)",
                task_id,
                slot.tasks[index].name,
                variables.len()
            );
            self.instances.emit(EngineEvent::TaskCompleted {
                task: task_id.clone(),
                instance: slot.instance.id.clone(),
                variables,
                at: completed_at,
            });

            self.instances.advance_locked(slot)
        })
    }
}
