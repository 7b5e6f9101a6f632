//! Process definitions - step model, validation and YAML loading

use super::form::FormProperty;
use crate::error::{EngineError, EngineResult};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").unwrap())
}

fn check_identifier(what: &str, id: &str) -> EngineResult<()> {
    if identifier_re().is_match(id) {
        Ok(())
    } else {
        Err(EngineError::invalid_definition(format!(
            "{} '{}' is not a valid identifier",
            what, id
        )))
    }
}

/// What a step does when the instance reaches it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Waits for a human to submit the form
    UserTask { form: Vec<FormProperty> },
    /// Terminal step; reaching it ends the instance
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub kind: StepKind,
}

impl Step {
    pub fn is_user_task(&self) -> bool {
        matches!(self.kind, StepKind::UserTask { .. })
    }

    pub fn step_type(&self) -> StepType {
        match self.kind {
            StepKind::UserTask { .. } => StepType::UserTask,
            StepKind::End => StepType::End,
        }
    }
}

/// Linear process template: user tasks in order, closed by an End step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDefinition {
    pub key: String,
    pub name: String,
    pub steps: Vec<Step>,
}

impl ProcessDefinition {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a user task step
    pub fn user_task(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        form: Vec<FormProperty>,
    ) -> Self {
        self.steps.push(Step {
            id: id.into(),
            name: name.into(),
            kind: StepKind::UserTask { form },
        });
        self
    }

    /// Append the terminal step
    pub fn end(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.steps.push(Step {
            name: id.clone(),
            id,
            kind: StepKind::End,
        });
        self
    }

    /// Number of user task steps
    pub fn user_task_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_user_task()).count()
    }

    /// Check the structural rules a definition must satisfy before deploy
    pub fn validate(&self) -> EngineResult<()> {
        check_identifier("Process key", &self.key)?;

        if self.steps.is_empty() {
            return Err(EngineError::invalid_definition("process has no steps"));
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            check_identifier("Step id", &step.id)?;
            if !seen.insert(step.id.as_str()) {
                return Err(EngineError::invalid_definition(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }

            match &step.kind {
                StepKind::UserTask { form } => {
                    let mut fields = HashSet::new();
                    for property in form {
                        check_identifier("Form property id", &property.id)?;
                        if !fields.insert(property.id.as_str()) {
                            return Err(EngineError::invalid_definition(format!(
                                "duplicate form property '{}' in step '{}'",
                                property.id, step.id
                            )));
                        }
                    }
                }
                StepKind::End if index + 1 < self.steps.len() => {
                    return Err(EngineError::invalid_definition(format!(
                        "step '{}' follows the terminal end step '{}'",
                        self.steps[index + 1].id,
                        step.id
                    )));
                }
                StepKind::End => {}
            }
        }

        if !matches!(self.steps.last().map(|s| &s.kind), Some(StepKind::End)) {
            return Err(EngineError::invalid_definition(
                "process must terminate in an end step",
            ));
        }

        Ok(())
    }

    /// Load a definition from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse a definition from YAML and resolve its step order
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: DefinitionFile = serde_yaml::from_str(content)?;
        Ok(file.into_definition()?)
    }
}

/// Step type as written in definition files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    UserTask,
    End,
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserTask => write!(f, "user-task"),
            Self::End => write!(f, "end"),
        }
    }
}

/// On-disk definition: steps linked by `next` references
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionFile {
    pub key: String,
    pub name: Option<String>,
    /// First step; defaults to the first listed step
    pub start: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSource {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Successor step; defaults to the next listed step
    pub next: Option<String>,
    #[serde(default)]
    pub form: Vec<FormProperty>,
}

impl DefinitionFile {
    /// Walk the `next` chain from the start step into a linear definition.
    ///
    /// Rejects cycles, dangling references and steps the chain never
    /// reaches, since the engine only runs single-path processes.
    pub fn into_definition(self) -> EngineResult<ProcessDefinition> {
        if self.steps.is_empty() {
            return Err(EngineError::invalid_definition("process has no steps"));
        }

        let mut index = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.id.as_str(), i).is_some() {
                return Err(EngineError::invalid_definition(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        let lookup = |id: &str, from: &str| {
            index.get(id).copied().ok_or_else(|| {
                EngineError::invalid_definition(format!(
                    "{} references unknown step '{}'",
                    from, id
                ))
            })
        };

        let mut cursor = match &self.start {
            Some(start) => Some(lookup(start, "start")?),
            None => Some(0),
        };
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.steps.len());

        while let Some(i) = cursor {
            if !visited.insert(i) {
                return Err(EngineError::invalid_definition(format!(
                    "cycle detected at step '{}'",
                    self.steps[i].id
                )));
            }
            order.push(i);

            let step = &self.steps[i];
            cursor = match (step.step_type, &step.next) {
                (StepType::End, None) => None,
                (StepType::End, Some(next)) => {
                    return Err(EngineError::invalid_definition(format!(
                        "end step '{}' cannot continue to '{}'",
                        step.id, next
                    )));
                }
                (StepType::UserTask, Some(next)) => {
                    Some(lookup(next, &format!("step '{}'", step.id))?)
                }
                (StepType::UserTask, None) if i + 1 < self.steps.len() => Some(i + 1),
                (StepType::UserTask, None) => {
                    return Err(EngineError::invalid_definition(format!(
                        "step '{}' has no successor; process must terminate in an end step",
                        step.id
                    )));
                }
            };
        }

        if let Some(orphan) = (0..self.steps.len()).find(|i| !visited.contains(i)) {
            return Err(EngineError::invalid_definition(format!(
                "step '{}' is unreachable",
                self.steps[orphan].id
            )));
        }

        let mut slots: Vec<Option<StepSource>> = self.steps.into_iter().map(Some).collect();
        let steps = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .map(|source| {
                let name = source.name.unwrap_or_else(|| source.id.clone());
                let kind = match source.step_type {
                    StepType::UserTask => StepKind::UserTask { form: source.form },
                    StepType::End => StepKind::End,
                };
                Step {
                    id: source.id,
                    name,
                    kind,
                }
            })
            .collect();

        let definition = ProcessDefinition {
            name: self.name.unwrap_or_else(|| self.key.clone()),
            key: self.key,
            steps,
        };
        definition.validate()?;
        Ok(definition)
    }
}
