//! Engine lifecycle events
//!
//! Each event carries the engine's own timestamp for the transition, so a
//! subscriber that drains late still sees when things happened.

use super::form::Variables;
use super::ids::{DefinitionId, InstanceId, TaskId};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Lifecycle event emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Deployed {
        definition: DefinitionId,
        name: String,
        at: DateTime<Utc>,
    },
    InstanceStarted {
        instance: InstanceId,
        definition: DefinitionId,
        at: DateTime<Utc>,
    },
    TaskCreated {
        task: TaskId,
        instance: InstanceId,
        name: String,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        task: TaskId,
        instance: InstanceId,
        variables: Variables,
        at: DateTime<Utc>,
    },
    InstanceEnded {
        instance: InstanceId,
        at: DateTime<Utc>,
    },
}

/// Optional event sender; emitting without a subscriber is a no-op
#[derive(Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
