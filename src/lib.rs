//! flowdesk - a small process engine with a console task client
//!
//! Deploy a linear process definition, start an instance, and complete its
//! user tasks one form at a time until the instance ends.

pub mod config;
pub mod console;
pub mod core;
pub mod engine;
pub mod error;
pub mod history;

// Re-exports
pub use config::EngineConfig;
pub use console::{drive, Console};
pub use crate::core::{
    DefinitionId, EngineEvent, FormProperty, FormType, FormValue, InstanceId, ProcessDefinition,
    ProcessInstance, Task, TaskId, TaskStatus, Variables,
};
pub use engine::ProcessEngine;
pub use error::{EngineError, EngineResult};
pub use history::RunLog;

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
