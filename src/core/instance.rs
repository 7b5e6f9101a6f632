//! Instance engine - runs process instances through their step sequence
//!
//! Each instance sits behind its own mutex. Every transition (start,
//! advance, task completion) happens while that lock is held, so at most
//! one transition per instance is in flight and instances never contend
//! with each other.

use super::events::{EngineEvent, EventSink};
use super::form::Variables;
use super::ids::{DefinitionId, IdGenerator, InstanceId, TaskId};
use super::store::{DefinitionStore, DeployedDefinition};
use super::task::{Task, TaskStatus};
use super::StepKind;
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Running,
    Ended,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Snapshot of one running execution of a definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: InstanceId,
    pub definition_id: DefinitionId,
    pub current_step: usize,
    pub ended: bool,
    pub variables: Variables,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ProcessInstance {
    pub fn state(&self) -> InstanceState {
        if self.ended {
            InstanceState::Ended
        } else {
            InstanceState::Running
        }
    }
}

/// Mutable per-instance record guarded by the instance lock
pub(crate) struct InstanceSlot {
    pub(crate) instance: ProcessInstance,
    pub(crate) definition: Arc<DeployedDefinition>,
    /// Every task this instance created, in creation order
    pub(crate) tasks: Vec<Task>,
}

impl InstanceSlot {
    pub(crate) fn pending_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Pending)
    }
}

/// Creates instances and moves them forward
pub struct InstanceEngine {
    definitions: Arc<DefinitionStore>,
    instances: RwLock<HashMap<InstanceId, Arc<Mutex<InstanceSlot>>>>,
    /// Task id to owning instance
    task_index: RwLock<HashMap<TaskId, InstanceId>>,
    ids: Arc<IdGenerator>,
    events: EventSink,
}

impl InstanceEngine {
    pub(crate) fn new(
        definitions: Arc<DefinitionStore>,
        ids: Arc<IdGenerator>,
        events: EventSink,
    ) -> Self {
        Self {
            definitions,
            instances: RwLock::new(HashMap::new()),
            task_index: RwLock::new(HashMap::new()),
            ids,
            events,
        }
    }

    /// Start an instance and enter its first step
    pub fn start(&self, definition_id: &DefinitionId) -> EngineResult<ProcessInstance> {
        let definition = self.definitions.get(definition_id)?;
        let id = InstanceId::new(self.ids.next_id().to_string());

        let slot = Arc::new(Mutex::new(InstanceSlot {
            instance: ProcessInstance {
                id: id.clone(),
                definition_id: definition_id.clone(),
                current_step: 0,
                ended: false,
                variables: Variables::new(),
                started_at: Utc::now(),
                ended_at: None,
            },
            definition,
            tasks: Vec::new(),
        }));

        // Hold the instance lock across registration so nobody observes the
        // instance before its first step is entered.
        let mut guard = slot.lock();
        self.instances.write().insert(id.clone(), slot.clone());

        log::info!("Started instance {} of {}", id, definition_id);
        self.events.emit(EngineEvent::InstanceStarted {
            instance: id.clone(),
            definition: definition_id.clone(),
            at: guard.instance.started_at,
        });

        self.enter_current_step(&mut guard);
        Ok(guard.instance.clone())
    }

    /// Move an instance to its next step.
    ///
    /// Fails with `TaskPending` while the current user task is still open.
    pub fn advance(&self, instance_id: &InstanceId) -> EngineResult<()> {
        self.with_slot(instance_id, |slot| self.advance_locked(slot))
    }

    pub fn is_ended(&self, instance_id: &InstanceId) -> EngineResult<bool> {
        self.with_slot(instance_id, |slot| Ok(slot.instance.ended))
    }

    /// Current snapshot of an instance
    pub fn get(&self, instance_id: &InstanceId) -> EngineResult<ProcessInstance> {
        self.with_slot(instance_id, |slot| Ok(slot.instance.clone()))
    }

    /// Run `f` with the instance lock held
    pub(crate) fn with_slot<R>(
        &self,
        instance_id: &InstanceId,
        f: impl FnOnce(&mut InstanceSlot) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let slot = self
            .instances
            .read()
            .get(instance_id)
            .cloned()
            .ok_or_else(|| EngineError::InstanceNotFound(instance_id.clone()))?;

        let mut guard = slot.lock();
        f(&mut guard)
    }

    pub(crate) fn task_owner(&self, task_id: &TaskId) -> Option<InstanceId> {
        self.task_index.read().get(task_id).cloned()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        self.events.emit(event);
    }

    /// Advance with the instance lock already held. Checks run before any
    /// mutation so a failure leaves the slot untouched.
    pub(crate) fn advance_locked(&self, slot: &mut InstanceSlot) -> EngineResult<()> {
        if slot.instance.ended {
            return Err(EngineError::InstanceEnded(slot.instance.id.clone()));
        }
        if let Some(task) = slot.pending_task() {
            return Err(EngineError::TaskPending {
                instance: slot.instance.id.clone(),
                task: task.id.clone(),
            });
        }

        slot.instance.current_step += 1;
        self.enter_current_step(slot);
        Ok(())
    }

    fn enter_current_step(&self, slot: &mut InstanceSlot) {
        let step = slot
            .definition
            .definition
            .steps
            .get(slot.instance.current_step);

        match step {
            Some(step) if step.is_user_task() => {
                let task = Task::new(
                    TaskId::new(self.ids.next_id().to_string()),
                    slot.instance.id.clone(),
                    slot.definition.id.clone(),
                    slot.instance.current_step,
                    step.name.clone(),
                );

                self.task_index
                    .write()
                    .insert(task.id.clone(), slot.instance.id.clone());
                log::info!(
                    "Instance {} waiting on task {} [{}]",
                    slot.instance.id,
                    task.id,
                    task.name
                );
                self.events.emit(EngineEvent::TaskCreated {
                    task: task.id.clone(),
                    instance: slot.instance.id.clone(),
                    name: task.name.clone(),
                    at: task.created_at,
                });
                slot.tasks.push(task);
            }
            // End step, or past the last step of a definition that somehow
            // lacks one: either way the instance is finished.
            _ => {
                debug_assert!(step.map_or(true, |s| s.kind == StepKind::End));
                let now = Utc::now();
                slot.instance.ended = true;
                slot.instance.ended_at = Some(now);
                log::info!("Instance {} ended", slot.instance.id);
                self.events.emit(EngineEvent::InstanceEnded {
                    instance: slot.instance.id.clone(),
                    at: now,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FormProperty, ProcessDefinition};

    fn engine_with(definition: ProcessDefinition) -> (InstanceEngine, DefinitionId) {
        let ids = Arc::new(IdGenerator::new());
        let store = Arc::new(DefinitionStore::new(ids.clone()));
        let def_id = store.deploy(definition).unwrap();
        (InstanceEngine::new(store, ids, EventSink::default()), def_id)
    }

    fn two_tasks() -> ProcessDefinition {
        ProcessDefinition::new("two", "Two")
            .user_task("first", "First", vec![FormProperty::string("a", "A")])
            .user_task("second", "Second", vec![FormProperty::string("b", "B")])
            .end("end")
    }

    #[test]
    fn test_start_creates_first_task() {
        let (engine, def_id) = engine_with(two_tasks());
        let instance = engine.start(&def_id).unwrap();
        assert_eq!(instance.state(), InstanceState::Running);
        assert_eq!(instance.current_step, 0);

        engine
            .with_slot(&instance.id, |slot| {
                assert_eq!(slot.tasks.len(), 1);
                assert_eq!(slot.tasks[0].name, "First");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_start_unknown_definition() {
        let (engine, _) = engine_with(two_tasks());
        let missing = DefinitionId::new("nope:1:99");
        assert_eq!(
            engine.start(&missing).unwrap_err(),
            EngineError::DefinitionNotFound(missing)
        );
    }

    #[test]
    fn test_end_only_definition_ends_immediately() {
        let (engine, def_id) = engine_with(ProcessDefinition::new("noop", "Noop").end("end"));
        let instance = engine.start(&def_id).unwrap();
        assert!(instance.ended);
        assert!(instance.ended_at.is_some());
        assert!(engine.is_ended(&instance.id).unwrap());
    }

    #[test]
    fn test_advance_refused_while_task_pending() {
        let (engine, def_id) = engine_with(two_tasks());
        let instance = engine.start(&def_id).unwrap();
        let err = engine.advance(&instance.id).unwrap_err();
        assert!(matches!(err, EngineError::TaskPending { .. }));
        assert_eq!(engine.get(&instance.id).unwrap().current_step, 0);
    }

    #[test]
    fn test_advance_on_ended_instance() {
        let (engine, def_id) = engine_with(ProcessDefinition::new("noop", "Noop").end("end"));
        let instance = engine.start(&def_id).unwrap();
        assert_eq!(
            engine.advance(&instance.id).unwrap_err(),
            EngineError::InstanceEnded(instance.id.clone())
        );
    }

    #[test]
    fn test_unknown_instance() {
        let (engine, _) = engine_with(two_tasks());
        let missing = InstanceId::new("404");
        assert_eq!(
            engine.is_ended(&missing).unwrap_err(),
            EngineError::InstanceNotFound(missing)
        );
    }
}
