//! Run history - persist what happened during each run

use crate::core::{DefinitionId, EngineEvent, InstanceId, TaskId, Variables};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the file pointing at the most recent run
const LATEST: &str = "latest";

/// One client run: the instance it drove and every task it saw
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    pub engine: String,
    pub definition: Option<DefinitionId>,
    pub definition_name: Option<String>,
    pub instance: Option<InstanceId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskRecord>,
}

/// A single task as seen by the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub name: String,
    pub created: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
    pub variables: Variables,
}

impl RunLog {
    /// Create a new run log
    pub fn new(engine: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: now.format("%Y-%m-%d-%H-%M-%S-%3f").to_string(),
            engine: engine.into(),
            definition: None,
            definition_name: None,
            instance: None,
            started_at: now,
            ended_at: None,
            tasks: Vec::new(),
        }
    }

    /// Fold one engine event into the log. Times come from the event, so
    /// draining after the run still records when each transition happened.
    pub fn record(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Deployed {
                definition, name, ..
            } => {
                self.definition = Some(definition.clone());
                self.definition_name = Some(name.clone());
            }
            EngineEvent::InstanceStarted { instance, at, .. } => {
                self.instance = Some(instance.clone());
                self.started_at = *at;
            }
            EngineEvent::TaskCreated { task, name, at, .. } => {
                self.tasks.push(TaskRecord {
                    task_id: task.clone(),
                    name: name.clone(),
                    created: *at,
                    completed: None,
                    variables: Variables::new(),
                });
            }
            EngineEvent::TaskCompleted {
                task,
                variables,
                at,
                ..
            } => {
                if let Some(record) = self.tasks.iter_mut().find(|r| r.task_id == *task) {
                    record.completed = Some(*at);
                    record.variables = variables.clone();
                }
            }
            EngineEvent::InstanceEnded { at, .. } => {
                self.ended_at = Some(*at);
            }
        }
    }

    /// Whether the driven instance reached its end
    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.id))
    }

    /// Save to `dir` and mark as the latest run
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let path = self.path_in(dir);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        fs::write(dir.join(LATEST), &self.id)?;

        Ok(path)
    }

    /// Load a run by id
    pub fn load(dir: &Path, id: &str) -> Result<Self> {
        let path = dir.join(format!("{}.json", id));
        let content = fs::read_to_string(&path)?;
        let log: RunLog = serde_json::from_str(&content)?;
        Ok(log)
    }

    /// Load the most recently saved run
    pub fn load_latest(dir: &Path) -> Result<Self> {
        let latest_path = dir.join(LATEST);
        if !latest_path.exists() {
            anyhow::bail!("No runs recorded in {}", dir.display());
        }

        let id = fs::read_to_string(&latest_path)?;
        Self::load(dir, id.trim())
    }

    /// Ids of all saved runs, most recent first
    pub fn list_all(dir: &Path) -> Result<Vec<String>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    runs.push(stem.to_string());
                }
            }
        }

        runs.sort();
        runs.reverse();
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FormProperty, FormValue, ProcessDefinition};
    use crate::engine::ProcessEngine;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn sample() -> RunLog {
        let mut log = RunLog::new("test");
        let instance = InstanceId::new("2");
        let task = TaskId::new("3");
        let mut vars = Variables::new();
        vars.insert("comment".into(), FormValue::from("ok"));

        log.record(&EngineEvent::Deployed {
            definition: DefinitionId::new("approve:1:1"),
            name: "Approve".into(),
            at: at(0),
        });
        log.record(&EngineEvent::InstanceStarted {
            instance: instance.clone(),
            definition: DefinitionId::new("approve:1:1"),
            at: at(1),
        });
        log.record(&EngineEvent::TaskCreated {
            task: task.clone(),
            instance: instance.clone(),
            name: "Approve".into(),
            at: at(1),
        });
        log.record(&EngineEvent::TaskCompleted {
            task,
            instance: instance.clone(),
            variables: vars,
            at: at(90),
        });
        log.record(&EngineEvent::InstanceEnded {
            instance,
            at: at(90),
        });
        log
    }

    #[test]
    fn test_record_events() {
        let log = sample();
        assert_eq!(log.definition_name.as_deref(), Some("Approve"));
        assert_eq!(log.instance, Some(InstanceId::new("2")));
        assert_eq!(log.tasks.len(), 1);
        assert_eq!(log.tasks[0].variables["comment"], FormValue::from("ok"));
        assert!(log.is_finished());
    }

    #[test]
    fn test_record_uses_event_times() {
        let log = sample();
        assert_eq!(log.started_at, at(1));
        assert_eq!(log.tasks[0].created, at(1));
        assert_eq!(log.tasks[0].completed, Some(at(90)));
        assert_eq!(log.ended_at, Some(at(90)));
    }

    #[test]
    fn test_late_drain_keeps_task_span() {
        let (engine, mut events) = ProcessEngine::with_events("test");
        let def_id = engine
            .deploy(
                ProcessDefinition::new("approve", "Approve")
                    .user_task(
                        "approve",
                        "Approve",
                        vec![FormProperty::string("comment", "Comment")],
                    )
                    .end("end"),
            )
            .unwrap();
        let instance = engine.start(&def_id).unwrap();
        let task = engine.list_pending(&instance.id).unwrap().remove(0);

        std::thread::sleep(std::time::Duration::from_millis(150));
        engine.complete(&task.id, Variables::new()).unwrap();

        // Drained only after the instance ended, as the CLI does
        let mut log = RunLog::new(engine.name());
        while let Ok(event) = events.try_recv() {
            log.record(&event);
        }

        let record = &log.tasks[0];
        let completed = record.completed.unwrap();
        assert!(completed - record.created >= Duration::milliseconds(150));
        assert_eq!(record.created, task.created_at);
        assert_eq!(log.started_at, instance.started_at);
        assert!(log.started_at <= record.created);
        assert!(log.ended_at.unwrap() >= completed);
    }

    #[test]
    fn test_save_and_load_latest() {
        let dir = tempdir().unwrap();
        let log = sample();
        let path = log.save(dir.path()).unwrap();
        assert!(path.exists());

        let loaded = RunLog::load_latest(dir.path()).unwrap();
        assert_eq!(loaded.id, log.id);
        assert_eq!(loaded.tasks[0].variables, log.tasks[0].variables);
        assert_eq!(loaded.tasks[0].completed, Some(at(90)));
        assert_eq!(RunLog::list_all(dir.path()).unwrap(), vec![log.id]);
    }

    #[test]
    fn test_empty_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("runs");
        assert!(RunLog::list_all(&missing).unwrap().is_empty());
        assert!(RunLog::load_latest(&missing).is_err());
    }
}
