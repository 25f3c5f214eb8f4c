//! Storage backends for tasks, members and the change log.
//!
//! Both backends only move records in and out; id assignment, lifecycle
//! rules and dependency clearing happen once in the service layer.

pub mod local;
pub mod mapping;
pub mod sharepoint;

use async_trait::async_trait;

pub use local::LocalStore;
pub use sharepoint::SharePointStore;

use super::environment::DataMode;
use super::error::Result;
use super::model::{LogEntry, Task, TeamMember};

#[async_trait]
pub trait TaskStore: Send + Sync {
    fn mode(&self) -> DataMode;

    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// Store a new task and return it as persisted.
    async fn insert_task(&self, task: Task) -> Result<Task>;

    /// Replace the task with the same id. `NotFound` when it does not exist.
    async fn save_task(&self, task: &Task) -> Result<Task>;

    async fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        for task in tasks {
            self.save_task(task).await?;
        }
        Ok(())
    }

    async fn remove_task(&self, id: &str) -> Result<()>;

    /// Remove `id`, store its already-cleared dependents and record `log`.
    ///
    /// The removal goes first so a later failure never leaves the task
    /// present with its references gone.
    async fn delete_task(&self, id: &str, dependents: &[Task], log: Vec<LogEntry>) -> Result<()> {
        self.remove_task(id).await?;
        if !dependents.is_empty() {
            self.save_tasks(dependents).await?;
        }
        self.append_log(log).await
    }

    async fn list_team(&self) -> Result<Vec<TeamMember>>;

    async fn insert_member(&self, member: TeamMember) -> Result<TeamMember>;

    async fn save_member(&self, member: &TeamMember) -> Result<TeamMember>;

    async fn remove_member(&self, id: &str) -> Result<()>;

    async fn append_log(&self, _entries: Vec<LogEntry>) -> Result<()> {
        Ok(())
    }

    async fn change_log(&self) -> Result<Vec<LogEntry>> {
        Ok(Vec::new())
    }
}
