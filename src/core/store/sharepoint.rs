//! SharePoint list storage reached through the Graph API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::local::read_team;
use super::mapping::{
    changed_fields, item_id, item_to_member, item_to_task, member_to_fields, task_to_fields,
};
use super::TaskStore;
use crate::core::environment::DataMode;
use crate::core::error::{Error, Result};
use crate::core::graph::GraphClient;
use crate::core::model::{Task, TeamMember};

const PAGE_SIZE: u32 = 500;

pub struct SharePointStore {
    client: Arc<GraphClient>,
    site_id: String,
    tasks_list_id: String,
    team_list_id: Option<String>,
    /// Local data.json read when the team list is unset or unreachable
    fallback_file: PathBuf,
}

impl SharePointStore {
    pub fn new(
        client: Arc<GraphClient>,
        site_id: impl Into<String>,
        tasks_list_id: impl Into<String>,
        team_list_id: Option<String>,
        data_dir: &Path,
    ) -> Self {
        Self {
            client,
            site_id: site_id.into(),
            tasks_list_id: tasks_list_id.into(),
            team_list_id,
            fallback_file: data_dir.join("data.json"),
        }
    }

    fn items_path(&self, list_id: &str) -> String {
        format!("/sites/{}/lists/{}/items", self.site_id, list_id)
    }

    fn team_list(&self) -> Result<&str> {
        self.team_list_id
            .as_deref()
            .ok_or_else(|| Error::Unavailable("SHAREPOINT_TEAM_LIST_ID is not set".to_string()))
    }

    /// Tasks paired with their list item ids.
    async fn task_items(&self) -> Result<Vec<(String, Task)>> {
        let path = format!(
            "{}?expand=fields&$top={PAGE_SIZE}",
            self.items_path(&self.tasks_list_id)
        );
        let items = self.client.get_paged(&path).await?;
        Ok(items
            .iter()
            .filter_map(|item| Some((item_id(item)?, item_to_task(item)?)))
            .collect())
    }

    async fn find_task_item(&self, task_id: &str) -> Result<(String, Task)> {
        self.task_items()
            .await?
            .into_iter()
            .find(|(_, task)| task.id == task_id)
            .ok_or_else(|| Error::not_found(format!("Task {task_id} not found")))
    }

    async fn member_items(&self, list_id: &str) -> Result<Vec<(String, TeamMember)>> {
        let path = format!("{}?expand=fields&$top={PAGE_SIZE}", self.items_path(list_id));
        let items = self.client.get_paged(&path).await?;
        Ok(items
            .iter()
            .filter_map(|item| Some((item_id(item)?, item_to_member(item))))
            .collect())
    }

    async fn find_member_item(&self, member_id: &str) -> Result<(String, TeamMember)> {
        let list_id = self.team_list()?;
        self.member_items(list_id)
            .await?
            .into_iter()
            .find(|(_, member)| member.id == member_id)
            .ok_or_else(|| Error::not_found(format!("Member {member_id} not found")))
    }

    /// POST the fields, then read the full item back; the create response
    /// does not reliably carry custom columns.
    async fn create_item(&self, list_id: &str, fields: Value) -> Result<Value> {
        let items = self.items_path(list_id);
        let created = self.client.post(&items, &json!({ "fields": fields })).await?;
        let id = item_id(&created)
            .ok_or_else(|| Error::Graph { status: 502, body: "create response has no item id".to_string() })?;
        self.client.get(&format!("{items}/{id}?expand=fields")).await
    }
}

#[async_trait]
impl TaskStore for SharePointStore {
    fn mode(&self) -> DataMode {
        DataMode::SharePoint
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.task_items().await?.into_iter().map(|(_, task)| task).collect())
    }

    async fn insert_task(&self, task: Task) -> Result<Task> {
        let item = self
            .create_item(&self.tasks_list_id, task_to_fields(&task))
            .await?;
        // A read-back without TaskId would mean the column mapping is broken
        Ok(item_to_task(&item).unwrap_or(task))
    }

    async fn save_task(&self, task: &Task) -> Result<Task> {
        let (item, existing) = self.find_task_item(&task.id).await?;
        let fields = changed_fields(&existing, task);
        if fields.as_object().is_some_and(|f| !f.is_empty()) {
            self.client
                .patch(&format!("{}/{item}/fields", self.items_path(&self.tasks_list_id)), &fields)
                .await?;
        }
        Ok(task.clone())
    }

    async fn remove_task(&self, id: &str) -> Result<()> {
        let (item, _) = self.find_task_item(id).await?;
        self.client
            .delete(&format!("{}/{item}", self.items_path(&self.tasks_list_id)))
            .await
    }

    async fn list_team(&self) -> Result<Vec<TeamMember>> {
        if let Some(list_id) = self.team_list_id.as_deref() {
            match self.member_items(list_id).await {
                Ok(items) => return Ok(items.into_iter().map(|(_, m)| m).collect()),
                Err(e) => log::warn!("Team list error, falling back to local file: {}", e),
            }
        }
        Ok(read_team(&self.fallback_file))
    }

    async fn insert_member(&self, member: TeamMember) -> Result<TeamMember> {
        let list_id = self.team_list()?;
        let item = self.create_item(list_id, member_to_fields(&member)).await?;
        Ok(item_to_member(&item))
    }

    async fn save_member(&self, member: &TeamMember) -> Result<TeamMember> {
        let (item, _) = self.find_member_item(&member.id).await?;
        let list_id = self.team_list()?;
        self.client
            .patch(
                &format!("{}/{item}/fields", self.items_path(list_id)),
                &member_to_fields(member),
            )
            .await?;
        Ok(member.clone())
    }

    async fn remove_member(&self, id: &str) -> Result<()> {
        let (item, _) = self.find_member_item(id).await?;
        let list_id = self.team_list()?;
        self.client
            .delete(&format!("{}/{item}", self.items_path(list_id)))
            .await
    }
}
