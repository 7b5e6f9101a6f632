//! Engine error taxonomy

use crate::core::{DefinitionId, InstanceId, TaskId};
use thiserror::Error;

/// Errors returned by the process engine kernel.
///
/// Every variant is a logic error reported to the caller. A call that fails
/// leaves engine state exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid process definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("Process definition {0} not found")]
    DefinitionNotFound(DefinitionId),

    #[error("Process instance {0} not found")]
    InstanceNotFound(InstanceId),

    #[error("Process instance {0} has already ended")]
    InstanceEnded(InstanceId),

    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    #[error("Task {0} is already completed")]
    AlreadyCompleted(TaskId),

    #[error("Process instance {instance} is waiting on task {task}")]
    TaskPending { instance: InstanceId, task: TaskId },

    #[error("Invalid form data for task {task}: {reason}")]
    InvalidFormData { task: TaskId, reason: String },

    #[error("Invalid input for field '{field}': '{input}' ({reason})")]
    InvalidInputFormat {
        field: String,
        input: String,
        reason: String,
    },
}

impl EngineError {
    pub(crate) fn invalid_definition(reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            reason: reason.into(),
        }
    }
}

/// Result type for kernel operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
