//! Core kernel - definitions, instances, tasks and form schemas

mod definition;
pub(crate) mod events;
mod form;
mod ids;
mod instance;
mod store;
mod task;

pub use definition::{DefinitionFile, ProcessDefinition, Step, StepKind, StepSource, StepType};
pub use events::EngineEvent;
pub use form::{
    format_hint, FormProperty, FormSchemaResolver, FormType, FormValue, Variables,
    DEFAULT_DATE_FORMAT,
};
pub use ids::{DefinitionId, IdGenerator, InstanceId, TaskId};
pub use instance::{InstanceEngine, InstanceState, ProcessInstance};
pub use store::{DefinitionStore, DeployedDefinition};
pub use task::{Task, TaskManager, TaskStatus};
