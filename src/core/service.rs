//! Every dashboard operation, implemented once over whichever store is active.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::alerts::{AlertEngine, AlertReport, DispatchReport};
use super::analysis::{compute_dashboard, DashboardSummary};
use super::config::{ConfigManager, Settings, SettingsPatch};
use super::environment::DataMode;
use super::error::{Error, Result};
use super::lifecycle;
use super::model::{
    member_id_from_name, next_task_id, LogEntry, MemberDraft, MemberPatch, Task, TaskDraft,
    TaskPatch, TeamMember, DEFAULT_WEEKLY_HOURS,
};
use super::notify::{Notifier, TaskEvent, TestEmail};
use super::store::TaskStore;
use super::workbook::{self, ExportData};

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex");
}

/// Alert state of one open task, as listed by `/api/alerts`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAlerts {
    pub task_id: String,
    pub name: String,
    pub assignee: String,
    pub status: String,
    pub due: Option<NaiveDate>,
    #[serde(flatten)]
    pub report: AlertReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

pub struct TaskService {
    store: Arc<dyn TaskStore>,
    notifier: Notifier,
    config_manager: ConfigManager,
    settings: Mutex<Settings>,
    id_prefix: String,
    /// Serializes read-modify-write sequences across both backends
    writes: tokio::sync::Mutex<()>,
}

fn hours_or_default(hours: Option<f64>) -> f64 {
    hours.filter(|h| *h > 0.0).unwrap_or(DEFAULT_WEEKLY_HOURS)
}

/// `None` for a blank address, an error for a malformed one.
fn checked_email(raw: Option<&str>) -> Result<Option<String>> {
    match raw.map(str::trim).filter(|e| !e.is_empty()) {
        None => Ok(None),
        Some(email) if EMAIL_RE.is_match(email) => Ok(Some(email.to_string())),
        Some(email) => Err(Error::invalid(format!("Invalid email address: {email}"))),
    }
}

impl TaskService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        notifier: Notifier,
        config_manager: ConfigManager,
        id_prefix: impl Into<String>,
    ) -> Self {
        let settings = config_manager.load();
        Self {
            store,
            notifier,
            config_manager,
            settings: Mutex::new(settings),
            id_prefix: id_prefix.into(),
            writes: tokio::sync::Mutex::new(()),
        }
    }

    fn settings_guard(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> DataMode {
        self.store.mode()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn settings(&self) -> Settings {
        self.settings_guard().clone()
    }

    /// Merge `patch` into the settings and persist them.
    pub fn update_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut settings = self.settings_guard();
        let mut updated = settings.clone();
        updated.apply(patch);
        self.config_manager.save(&updated)?;
        *settings = updated.clone();
        log::info!("Settings saved to {:?}", self.config_manager.path());
        Ok(updated)
    }

    async fn log_entries(&self, entries: Vec<LogEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.store.append_log(entries).await
    }

    /// Background lifecycle email; looks up the assignee's address by name.
    async fn notify(&self, task: &Task, event: TaskEvent, settings: &Settings) {
        if !self.notifier.is_enabled() {
            return;
        }
        let email = if task.assignee.is_empty() {
            None
        } else {
            match self.store.list_team().await {
                Ok(team) => team
                    .iter()
                    .find(|m| m.name == task.assignee)
                    .and_then(|m| m.contact().map(str::to_string)),
                Err(e) => {
                    log::warn!("Could not load team for {} notification: {}", event.as_str(), e);
                    None
                }
            }
        };
        self.notifier.notify_task(task, event, email.as_deref(), settings);
    }

    // Tasks

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.store.list_tasks().await
    }

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task> {
        let settings = self.settings();
        let created = {
            let _writes = self.writes.lock().await;
            let tasks = self.store.list_tasks().await?;
            let id = next_task_id(&tasks, &self.id_prefix);
            let now = Utc::now();
            let task = lifecycle::materialize(&draft, id, &settings, now);
            let created = self.store.insert_task(task).await?;
            self.log_entries(vec![LogEntry::created(&created.id, now)]).await?;
            created
        };
        log::info!("Created task {}", created.id);
        self.notify(&created, TaskEvent::Created, &settings).await;
        Ok(created)
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let settings = self.settings();
        let (before, saved) = {
            let _writes = self.writes.lock().await;
            let tasks = self.store.list_tasks().await?;
            let mut task = tasks
                .into_iter()
                .find(|t| t.id == id)
                .ok_or_else(|| Error::not_found("Task not found"))?;
            if patch.is_empty() {
                log::debug!("Empty update for task {}, nothing written", id);
                return Ok(task);
            }
            log::debug!("Updating task {}: {:?}", id, patch.touched_fields());
            let before = task.clone();
            let now = Utc::now();
            let changes = lifecycle::apply_patch(&mut task, &patch, settings.done_status(), now);
            let saved = self.store.save_task(&task).await?;
            let entries = changes
                .into_iter()
                .map(|change| LogEntry::changed(&saved.id, change, now))
                .collect();
            self.log_entries(entries).await?;
            (before, saved)
        };

        if saved.status != before.status {
            let event = TaskEvent::StatusChanged {
                old: before.status.clone(),
            };
            self.notify(&saved, event, &settings).await;
        }
        if !saved.assignee.is_empty() && saved.assignee != before.assignee {
            self.notify(&saved, TaskEvent::Assigned, &settings).await;
        }
        Ok(saved)
    }

    /// Remove a task and clear every dependency reference to it.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let _writes = self.writes.lock().await;
        let tasks = self.store.list_tasks().await?;
        if !tasks.iter().any(|t| t.id == id) {
            return Err(Error::not_found("Task not found"));
        }
        let now = Utc::now();
        let dependents: Vec<Task> = tasks
            .into_iter()
            .filter(|t| t.dependency.as_deref() == Some(id))
            .map(|mut t| {
                t.dependency = None;
                t.last_updated = Some(now);
                t
            })
            .collect();
        if !dependents.is_empty() {
            log::debug!("Clearing dependency on {} from {} task(s)", id, dependents.len());
        }
        self.store
            .delete_task(id, &dependents, vec![LogEntry::deleted(id, now)])
            .await?;
        log::info!("Deleted task {}", id);
        Ok(())
    }

    // Team

    pub async fn list_team(&self) -> Result<Vec<TeamMember>> {
        self.store.list_team().await
    }

    pub async fn create_member(&self, draft: MemberDraft) -> Result<TeamMember> {
        let name = draft
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::invalid("Name is required"))?
            .to_string();
        let email = checked_email(draft.email.as_deref())?;
        let id = draft
            .id
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| member_id_from_name(&name));

        let _writes = self.writes.lock().await;
        let team = self.store.list_team().await?;
        if team.iter().any(|m| m.id == id) {
            return Err(Error::Conflict(format!("Member with id {id} already exists")));
        }
        let member = TeamMember {
            id,
            name,
            role: draft.role.unwrap_or_default(),
            hours: hours_or_default(draft.hours),
            email,
        };
        let created = self.store.insert_member(member).await?;
        log::info!("Added team member {}", created.id);
        Ok(created)
    }

    pub async fn update_member(&self, id: &str, patch: MemberPatch) -> Result<TeamMember> {
        let _writes = self.writes.lock().await;
        let team = self.store.list_team().await?;
        let mut member = team
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::not_found("Member not found"))?;

        if let Some(name) = patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::invalid("Name is required"));
            }
            member.name = name.to_string();
        }
        if let Some(role) = patch.role {
            member.role = role;
        }
        if patch.hours.is_some() {
            member.hours = hours_or_default(patch.hours);
        }
        if let Some(email) = patch.email {
            member.email = checked_email(Some(&email))?;
        }
        self.store.save_member(&member).await
    }

    /// Remove a member; tasks assigned to them become unassigned.
    pub async fn delete_member(&self, id: &str) -> Result<()> {
        let _writes = self.writes.lock().await;
        let team = self.store.list_team().await?;
        let member = team
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::not_found("Member not found"))?;

        let now = Utc::now();
        let orphaned: Vec<Task> = self
            .store
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| t.assignee == member.name)
            .map(|mut t| {
                t.assignee.clear();
                t.last_updated = Some(now);
                t
            })
            .collect();
        if !orphaned.is_empty() {
            log::info!("Unassigning {} task(s) from {}", orphaned.len(), member.name);
            self.store.save_tasks(&orphaned).await?;
        }
        self.store.remove_member(id).await?;
        log::info!("Removed team member {}", id);
        Ok(())
    }

    // Alerts

    /// Open tasks that currently raise at least one alert.
    pub async fn alerts(&self, today: NaiveDate) -> Result<Vec<TaskAlerts>> {
        let settings = self.settings();
        let engine = AlertEngine::new(settings.alert_settings.clone());
        let tasks = self.store.list_tasks().await?;
        Ok(tasks
            .into_iter()
            .filter(|t| !t.is_done(settings.done_status()))
            .filter_map(|task| {
                let report = engine.evaluate(&task, today, &settings);
                (!report.is_ok()).then(|| TaskAlerts {
                    task_id: task.id,
                    name: task.name,
                    assignee: task.assignee,
                    status: task.status,
                    due: task.due,
                    report,
                })
            })
            .collect())
    }

    /// Email every alert due today. Fails when no mailer is configured.
    pub async fn send_alerts(&self, today: NaiveDate) -> Result<DispatchReport> {
        let mailer = self
            .notifier
            .mailer()
            .cloned()
            .ok_or_else(|| Error::Unavailable("Email alerts are not configured".to_string()))?;
        let settings = self.settings();
        let tasks = self.store.list_tasks().await?;
        let team = self.store.list_team().await?;

        let engine = AlertEngine::new(settings.alert_settings.clone());
        let plan = engine.plan(&tasks, &team, today, &settings, self.notifier.recipients());
        log::info!("Alert check: {} email(s) planned for {} task(s)", plan.len(), tasks.len());
        Ok(engine.dispatch(&plan, mailer.as_ref()).await)
    }

    pub async fn send_test_email(&self, request: TestEmail) -> Result<Vec<String>> {
        self.notifier.send_test(request).await
    }

    // Reporting

    pub async fn dashboard(&self, today: NaiveDate) -> Result<DashboardSummary> {
        let settings = self.settings();
        let tasks = self.store.list_tasks().await?;
        let team = self.store.list_team().await?;
        Ok(compute_dashboard(&tasks, &team, &settings, today))
    }

    pub async fn export(&self, today: NaiveDate) -> Result<Vec<u8>> {
        let settings = self.settings();
        let tasks = self.store.list_tasks().await?;
        let team = self.store.list_team().await?;
        let log = self.store.change_log().await?;
        let summary = compute_dashboard(&tasks, &team, &settings, today);
        workbook::export_workbook(&ExportData {
            tasks: &tasks,
            team: &team,
            settings: &settings,
            kpis: &summary.kpis,
            log: &log,
        })
    }

    /// Upsert every task row of an uploaded workbook by id.
    pub async fn import(&self, bytes: &[u8]) -> Result<ImportReport> {
        let parsed = workbook::parse_task_sheet(bytes)?;
        let settings = self.settings();
        let mut report = ImportReport {
            errors: parsed.errors,
            ..ImportReport::default()
        };

        let _writes = self.writes.lock().await;
        let mut tasks = self.store.list_tasks().await?;
        let mut seen: HashSet<String> = HashSet::new();
        let now = Utc::now();

        for row in parsed.rows {
            let requested = row.draft.id.as_deref().map(str::trim).filter(|i| !i.is_empty());
            let existing = requested.and_then(|id| tasks.iter().position(|t| t.id == id));

            let outcome = match existing {
                Some(index) => {
                    let mut task = tasks[index].clone();
                    let patch = TaskPatch::from(&row.draft);
                    lifecycle::apply_patch(&mut task, &patch, settings.done_status(), now);
                    self.store.save_task(&task).await.map(|saved| {
                        tasks[index] = saved;
                        report.updated += 1;
                    })
                }
                None => {
                    let id = requested
                        .map(str::to_string)
                        .unwrap_or_else(|| next_task_id(&tasks, &self.id_prefix));
                    let task = lifecycle::materialize(&row.draft, id, &settings, now);
                    self.store.insert_task(task).await.map(|created| {
                        tasks.push(created);
                        report.imported += 1;
                    })
                }
            };
            if let Some(id) = requested {
                if !seen.insert(id.to_string()) {
                    log::warn!("Row {}: id {} appears more than once", row.row, id);
                }
            }
            if let Err(e) = outcome {
                report.errors.push(format!("Row {}: {}", row.row, e));
            }
        }

        self.log_entries(vec![LogEntry::import(
            report.imported,
            report.updated,
            report.errors.len(),
            now,
        )])
        .await?;
        log::info!(
            "Import finished: {} imported, {} updated, {} error(s)",
            report.imported,
            report.updated,
            report.errors.len()
        );
        Ok(report)
    }
}
