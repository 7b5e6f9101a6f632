//! Process engine - one handle over the whole kernel

use crate::core::events::EventSink;
use crate::core::{
    DefinitionId, DefinitionStore, DeployedDefinition, EngineEvent, FormProperty,
    FormSchemaResolver, IdGenerator, InstanceEngine, InstanceId, ProcessDefinition,
    ProcessInstance, Task, TaskId, TaskManager, Variables,
};
use crate::error::EngineResult;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Engine version reported at startup
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wires the definition store, instance engine, task manager and form
/// resolver together. `Send + Sync`; share it behind an `Arc`.
pub struct ProcessEngine {
    name: String,
    definitions: Arc<DefinitionStore>,
    instances: Arc<InstanceEngine>,
    tasks: TaskManager,
    forms: FormSchemaResolver,
    events: EventSink,
}

impl ProcessEngine {
    /// Create an engine that emits no events
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), EventSink::default())
    }

    /// Create an engine plus a receiver for its lifecycle events
    pub fn with_events(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sink, rx) = EventSink::channel();
        (Self::build(name.into(), sink), rx)
    }

    fn build(name: String, events: EventSink) -> Self {
        let ids = Arc::new(IdGenerator::new());
        let definitions = Arc::new(DefinitionStore::new(ids.clone()));
        let instances = Arc::new(InstanceEngine::new(
            definitions.clone(),
            ids,
            events.clone(),
        ));

        Self {
            name,
            tasks: TaskManager::new(instances.clone()),
            forms: FormSchemaResolver::new(definitions.clone()),
            definitions,
            instances,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deploy(&self, definition: ProcessDefinition) -> EngineResult<DefinitionId> {
        let name = definition.name.clone();
        let id = self.definitions.deploy(definition).map_err(|e| {
            log::warn!("Deployment of '{}' rejected: {}", name, e);
            e
        })?;

        let deployed = self.definitions.get(&id)?;
        log::info!(
            "Deployed definition [{}], id [{}], version [{}]",
            name,
            id,
            deployed.version
        );
        self.events.emit(EngineEvent::Deployed {
            definition: id.clone(),
            name,
            at: deployed.deployed_at,
        });
        Ok(id)
    }

    pub fn definition(&self, id: &DefinitionId) -> EngineResult<Arc<DeployedDefinition>> {
        self.definitions.get(id)
    }

    pub fn definitions(&self) -> Vec<Arc<DeployedDefinition>> {
        self.definitions.list()
    }

    /// Most recent deployment of a definition key
    pub fn latest_definition(&self, key: &str) -> Option<Arc<DeployedDefinition>> {
        self.definitions.latest(key)
    }

    pub fn start(&self, definition_id: &DefinitionId) -> EngineResult<ProcessInstance> {
        self.instances.start(definition_id)
    }

    pub fn advance(&self, instance_id: &InstanceId) -> EngineResult<()> {
        self.instances.advance(instance_id)
    }

    pub fn is_ended(&self, instance_id: &InstanceId) -> EngineResult<bool> {
        self.instances.is_ended(instance_id)
    }

    pub fn instance(&self, instance_id: &InstanceId) -> EngineResult<ProcessInstance> {
        self.instances.get(instance_id)
    }

    pub fn list_pending(&self, instance_id: &InstanceId) -> EngineResult<Vec<Task>> {
        self.tasks.list_pending(instance_id)
    }

    pub fn task(&self, task_id: &TaskId) -> EngineResult<Task> {
        self.tasks.get(task_id)
    }

    pub fn task_history(&self, instance_id: &InstanceId) -> EngineResult<Vec<Task>> {
        self.tasks.history(instance_id)
    }

    pub fn resolve_form(&self, task: &Task) -> EngineResult<Vec<FormProperty>> {
        self.forms.resolve(task)
    }

    pub fn complete(&self, task_id: &TaskId, variables: Variables) -> EngineResult<()> {
        self.tasks.complete(task_id, variables)
    }

    /// Validate variables against the task's form, then complete it
    pub fn submit_form(&self, task_id: &TaskId, variables: Variables) -> EngineResult<()> {
        let task = self.tasks.get(task_id)?;
        if task.is_pending() {
            self.forms.validate(&task, &variables)?;
        }
        self.tasks.complete(task_id, variables)
    }
}
