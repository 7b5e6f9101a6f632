//! Definition store - append-only registry of deployed definitions

use super::definition::ProcessDefinition;
use super::ids::{DefinitionId, IdGenerator};
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A definition as held by the store after deploy
#[derive(Debug, Clone)]
pub struct DeployedDefinition {
    pub id: DefinitionId,
    /// Deployment count for this key, starting at 1
    pub version: u32,
    pub deployed_at: DateTime<Utc>,
    pub definition: ProcessDefinition,
}

#[derive(Default)]
struct StoreInner {
    deployed: Vec<Arc<DeployedDefinition>>,
    by_id: HashMap<DefinitionId, usize>,
    by_key: HashMap<String, Vec<usize>>,
}

/// Deployed definitions keyed by id. Entries are never mutated or removed.
pub struct DefinitionStore {
    inner: RwLock<StoreInner>,
    ids: Arc<IdGenerator>,
}

impl DefinitionStore {
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            ids,
        }
    }

    /// Validate and register a definition under a fresh id
    pub fn deploy(&self, definition: ProcessDefinition) -> EngineResult<DefinitionId> {
        definition.validate()?;

        let mut inner = self.inner.write();
        let version = inner
            .by_key
            .get(&definition.key)
            .map(|v| v.len() as u32 + 1)
            .unwrap_or(1);
        let id = DefinitionId::new(format!(
            "{}:{}:{}",
            definition.key,
            version,
            self.ids.next_id()
        ));

        let slot = inner.deployed.len();
        inner.by_id.insert(id.clone(), slot);
        inner
            .by_key
            .entry(definition.key.clone())
            .or_default()
            .push(slot);
        inner.deployed.push(Arc::new(DeployedDefinition {
            id: id.clone(),
            version,
            deployed_at: Utc::now(),
            definition,
        }));

        Ok(id)
    }

    pub fn get(&self, id: &DefinitionId) -> EngineResult<Arc<DeployedDefinition>> {
        let inner = self.inner.read();
        inner
            .by_id
            .get(id)
            .map(|&slot| inner.deployed[slot].clone())
            .ok_or_else(|| EngineError::DefinitionNotFound(id.clone()))
    }

    /// Most recent deployment of a key
    pub fn latest(&self, key: &str) -> Option<Arc<DeployedDefinition>> {
        let inner = self.inner.read();
        inner
            .by_key
            .get(key)
            .and_then(|slots| slots.last())
            .map(|&slot| inner.deployed[slot].clone())
    }

    /// All deployments in deploy order
    pub fn list(&self) -> Vec<Arc<DeployedDefinition>> {
        self.inner.read().deployed.clone()
    }
}
