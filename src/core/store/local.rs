//! Local JSON file storage.
//!
//! Everything lives in a single `data.json` next to `settings.json`. Each
//! operation is a read-modify-write of the whole file under one lock.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::TaskStore;
use crate::core::environment::DataMode;
use crate::core::error::{Error, Result};
use crate::core::model::{LogEntry, Task, TeamMember};

/// On-disk layout of `data.json`. Unknown top-level keys are kept.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DataFile {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub team: Vec<TeamMember>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct LocalStore {
    /// Path to data.json
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("data.json"),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<DataFile> {
        read_data_file(&self.path)
    }

    fn write(&self, data: &DataFile) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(data)?;
        // Write to a sibling file first so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    async fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut DataFile) -> Result<T>,
    {
        let _guard = self.lock.lock().await;
        let mut data = self.read()?;
        let out = f(&mut data)?;
        self.write(&data)?;
        Ok(out)
    }

    async fn snapshot(&self) -> Result<DataFile> {
        let _guard = self.lock.lock().await;
        self.read()
    }
}

/// A missing file is an empty data set.
pub fn read_data_file(path: &Path) -> Result<DataFile> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(DataFile::default()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DataFile::default()),
        Err(e) => Err(e.into()),
    }
}

/// Team section of a local data file; used as the remote team fallback.
pub fn read_team(path: &Path) -> Vec<TeamMember> {
    match read_data_file(path) {
        Ok(data) => data.team,
        Err(e) => {
            log::warn!("Could not read team from {:?}: {}", path, e);
            Vec::new()
        }
    }
}

fn task_not_found(id: &str) -> Error {
    Error::not_found(format!("Task {id} not found"))
}

fn member_not_found(id: &str) -> Error {
    Error::not_found(format!("Member {id} not found"))
}

#[async_trait]
impl TaskStore for LocalStore {
    fn mode(&self) -> DataMode {
        DataMode::Local
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.snapshot().await?.tasks)
    }

    async fn insert_task(&self, task: Task) -> Result<Task> {
        self.modify(|data| {
            if data.tasks.iter().any(|t| t.id == task.id) {
                return Err(Error::Conflict(format!("Task {} already exists", task.id)));
            }
            data.tasks.push(task.clone());
            Ok(task)
        })
        .await
    }

    async fn save_task(&self, task: &Task) -> Result<Task> {
        self.modify(|data| {
            let slot = data
                .tasks
                .iter_mut()
                .find(|t| t.id == task.id)
                .ok_or_else(|| task_not_found(&task.id))?;
            *slot = task.clone();
            Ok(task.clone())
        })
        .await
    }

    async fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        self.modify(|data| {
            for task in tasks {
                let slot = data
                    .tasks
                    .iter_mut()
                    .find(|t| t.id == task.id)
                    .ok_or_else(|| task_not_found(&task.id))?;
                *slot = task.clone();
            }
            Ok(())
        })
        .await
    }

    async fn remove_task(&self, id: &str) -> Result<()> {
        self.modify(|data| {
            let before = data.tasks.len();
            data.tasks.retain(|t| t.id != id);
            if data.tasks.len() == before {
                return Err(task_not_found(id));
            }
            Ok(())
        })
        .await
    }

    async fn delete_task(&self, id: &str, dependents: &[Task], log: Vec<LogEntry>) -> Result<()> {
        self.modify(|data| {
            let before = data.tasks.len();
            data.tasks.retain(|t| t.id != id);
            if data.tasks.len() == before {
                return Err(task_not_found(id));
            }
            for task in dependents {
                if let Some(slot) = data.tasks.iter_mut().find(|t| t.id == task.id) {
                    *slot = task.clone();
                }
            }
            data.log.extend(log);
            Ok(())
        })
        .await
    }

    async fn list_team(&self) -> Result<Vec<TeamMember>> {
        Ok(self.snapshot().await?.team)
    }

    async fn insert_member(&self, member: TeamMember) -> Result<TeamMember> {
        self.modify(|data| {
            if data.team.iter().any(|m| m.id == member.id) {
                return Err(Error::Conflict(format!("Member {} already exists", member.id)));
            }
            data.team.push(member.clone());
            Ok(member)
        })
        .await
    }

    async fn save_member(&self, member: &TeamMember) -> Result<TeamMember> {
        self.modify(|data| {
            let slot = data
                .team
                .iter_mut()
                .find(|m| m.id == member.id)
                .ok_or_else(|| member_not_found(&member.id))?;
            *slot = member.clone();
            Ok(member.clone())
        })
        .await
    }

    async fn remove_member(&self, id: &str) -> Result<()> {
        self.modify(|data| {
            let before = data.team.len();
            data.team.retain(|m| m.id != id);
            if data.team.len() == before {
                return Err(member_not_found(id));
            }
            Ok(())
        })
        .await
    }

    async fn append_log(&self, entries: Vec<LogEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.modify(|data| {
            data.log.extend(entries);
            Ok(())
        })
        .await
    }

    async fn change_log(&self) -> Result<Vec<LogEntry>> {
        Ok(self.snapshot().await?.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn task(id: &str) -> Task {
        serde_json::from_value(json!({
            "id": id, "name": format!("Task {id}"), "status": "To Do", "priority": "Medium"
        }))
        .unwrap()
    }

    fn member(id: &str) -> TeamMember {
        TeamMember {
            id: id.to_string(),
            name: id.to_uppercase(),
            role: "PM".to_string(),
            hours: 32.0,
            email: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.list_tasks().await.unwrap().is_empty());
        assert!(store.list_team().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_task_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.insert_task(task("TASK-001")).await.unwrap();
        store.insert_task(task("TASK-002")).await.unwrap();

        let mut edited = task("TASK-002");
        edited.progress = 60;
        store.save_task(&edited).await.unwrap();
        store.remove_task("TASK-001").await.unwrap();

        let reopened = LocalStore::new(dir.path());
        let tasks = reopened.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].progress, 60);
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(matches!(store.save_task(&task("TASK-009")).await, Err(Error::NotFound(_))));
        assert!(matches!(store.remove_task("TASK-009").await, Err(Error::NotFound(_))));
        assert!(matches!(store.remove_member("ghost").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_member_conflicts() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.insert_member(member("anna")).await.unwrap();
        assert!(matches!(store.insert_member(member("anna")).await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_unknown_keys_survive_writes() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("data.json"),
            r#"{"tasks": [], "team": [], "log": [], "version": 3}"#,
        )
        .unwrap();
        let store = LocalStore::new(dir.path());
        store.insert_member(member("anna")).await.unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 3);
        assert_eq!(raw["team"][0]["id"], "anna");
        assert_eq!(read_team(store.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_log_appends() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.append_log(vec![LogEntry::created("TASK-001", Utc::now())]).await.unwrap();
        store.append_log(vec![LogEntry::deleted("TASK-001", Utc::now())]).await.unwrap();
        let log = store.change_log().await.unwrap();
        let actions: Vec<_> = log.iter().map(|e| e.action_label()).collect();
        assert_eq!(actions, vec!["created", "deleted"]);
    }

    #[tokio::test]
    async fn test_delete_task_is_one_write() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.insert_task(task("TASK-001")).await.unwrap();
        let mut dependent = task("TASK-002");
        dependent.dependency = Some("TASK-001".to_string());
        store.insert_task(dependent.clone()).await.unwrap();

        // unknown id: nothing is touched, not even the dependents
        let mut cleared = dependent.clone();
        cleared.dependency = None;
        let err = store
            .delete_task("TASK-009", &[cleared.clone()], vec![LogEntry::deleted("TASK-009", Utc::now())])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let tasks = store.list_tasks().await.unwrap();
        assert_eq!(tasks[1].dependency.as_deref(), Some("TASK-001"));
        assert!(store.change_log().await.unwrap().is_empty());

        store
            .delete_task("TASK-001", &[cleared], vec![LogEntry::deleted("TASK-001", Utc::now())])
            .await
            .unwrap();
        let tasks = store.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].dependency, None);
        assert_eq!(store.change_log().await.unwrap().len(), 1);
    }

    #[test]
    fn test_read_team_tolerates_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "not json").unwrap();
        assert!(read_team(&path).is_empty());
    }
}
