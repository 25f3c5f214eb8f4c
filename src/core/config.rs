use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::alerts::engine::AlertEngineConfig;

/// Status values that drive lifecycle side effects and alert rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatuses {
    /// Status given to new tasks without a valid one
    pub todo: String,
    /// Status watched by the stale and at-risk rules
    pub in_progress: String,
    /// Completion status; must always be present in the status list
    pub done: String,
    pub blocked: String,
}

impl Default for WorkflowStatuses {
    fn default() -> Self {
        Self {
            todo: "To Do".to_string(),
            in_progress: "In Progress".to_string(),
            done: "Done".to_string(),
            blocked: "Blocked".to_string(),
        }
    }
}

/// Workload utilisation bands in percent of weekly capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RagThresholds {
    pub green: f64,
    pub yellow: f64,
    pub orange: f64,
}

impl Default for RagThresholds {
    fn default() -> Self {
        Self {
            green: 70.0,
            yellow: 90.0,
            orange: 100.0,
        }
    }
}

/// Dashboard settings, persisted in settings.json.
/// NOTE: the frontend reads these keys directly; keep names camelCase.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_statuses")]
    pub statuses: Vec<String>,
    #[serde(default = "default_priorities")]
    pub priorities: Vec<String>,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,
    /// Kanban column limits by status
    #[serde(default = "default_wip_limits")]
    pub wip_limits: BTreeMap<String, u32>,
    #[serde(default = "default_status_colors")]
    pub status_colors: BTreeMap<String, String>,
    #[serde(default = "default_priority_colors")]
    pub priority_colors: BTreeMap<String, String>,
    #[serde(default)]
    pub category_colors: BTreeMap<String, String>,
    #[serde(default)]
    pub rag_thresholds: RagThresholds,
    #[serde(default)]
    pub workflow: WorkflowStatuses,
    #[serde(default = "default_priority")]
    pub default_priority: String,
    #[serde(default = "default_category")]
    pub default_category: String,
    /// Alert system configuration
    #[serde(default)]
    pub alert_settings: AlertEngineConfig,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn colors(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn default_statuses() -> Vec<String> {
    strings(&["To Do", "In Progress", "In Review", "Done", "Blocked"])
}

fn default_priorities() -> Vec<String> {
    strings(&["Critical", "High", "Medium", "Low"])
}

fn default_categories() -> Vec<String> {
    strings(&[
        "Grants",
        "Consulting",
        "Marketing",
        "Administration",
        "Advisory",
        "Internal",
    ])
}

fn default_roles() -> Vec<String> {
    strings(&[
        "PM",
        "Manager",
        "Specialist",
        "Analyst",
        "Marketing",
        "Advisor",
        "Administration",
        "Consultant",
    ])
}

fn default_wip_limits() -> BTreeMap<String, u32> {
    BTreeMap::from([("In Progress".to_string(), 8), ("In Review".to_string(), 4)])
}

fn default_status_colors() -> BTreeMap<String, String> {
    colors(&[
        ("To Do", "#94a3b8"),
        ("In Progress", "#3b82f6"),
        ("In Review", "#f59e0b"),
        ("Done", "#22c55e"),
        ("Blocked", "#ef4444"),
    ])
}

fn default_priority_colors() -> BTreeMap<String, String> {
    colors(&[
        ("Critical", "#dc2626"),
        ("High", "#f97316"),
        ("Medium", "#eab308"),
        ("Low", "#94a3b8"),
    ])
}

fn default_priority() -> String {
    "Medium".to_string()
}

fn default_category() -> String {
    "Internal".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            statuses: default_statuses(),
            priorities: default_priorities(),
            categories: default_categories(),
            roles: default_roles(),
            wip_limits: default_wip_limits(),
            status_colors: default_status_colors(),
            priority_colors: default_priority_colors(),
            category_colors: BTreeMap::new(),
            rag_thresholds: RagThresholds::default(),
            workflow: WorkflowStatuses::default(),
            default_priority: default_priority(),
            default_category: default_category(),
            alert_settings: AlertEngineConfig::default_enabled(),
        }
    }
}

/// Partial settings update; only known keys are merged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub statuses: Option<Vec<String>>,
    pub priorities: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
    pub wip_limits: Option<BTreeMap<String, u32>>,
    pub status_colors: Option<BTreeMap<String, String>>,
    pub priority_colors: Option<BTreeMap<String, String>>,
    pub category_colors: Option<BTreeMap<String, String>>,
    pub rag_thresholds: Option<RagThresholds>,
    pub workflow: Option<WorkflowStatuses>,
    pub default_priority: Option<String>,
    pub default_category: Option<String>,
    pub alert_settings: Option<AlertEngineConfig>,
}

impl Settings {
    /// Re-add the done status if an edit removed it. Returns true when changed.
    pub fn ensure_done_status(&mut self) -> bool {
        if self.statuses.iter().any(|s| *s == self.workflow.done) {
            return false;
        }
        self.statuses.push(self.workflow.done.clone());
        true
    }

    pub fn apply(&mut self, patch: SettingsPatch) {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(value) = patch.$field {
                    self.$field = value;
                })*
            };
        }
        merge!(
            statuses,
            priorities,
            categories,
            roles,
            wip_limits,
            status_colors,
            priority_colors,
            category_colors,
            rag_thresholds,
            workflow,
            default_priority,
            default_category,
            alert_settings
        );
        self.ensure_done_status();
    }

    pub fn done_status(&self) -> &str {
        &self.workflow.done
    }

    /// `requested` if it is a configured status, otherwise the to-do status.
    pub fn resolve_status(&self, requested: Option<&str>) -> String {
        pick(&self.statuses, requested, &self.workflow.todo)
    }

    pub fn resolve_priority(&self, requested: Option<&str>) -> String {
        pick(&self.priorities, requested, &self.default_priority)
    }

    pub fn resolve_category(&self, requested: Option<&str>) -> String {
        pick(&self.categories, requested, &self.default_category)
    }

    pub fn wip_limit(&self, status: &str) -> Option<u32> {
        self.wip_limits.get(status).copied().filter(|limit| *limit > 0)
    }
}

fn pick(allowed: &[String], requested: Option<&str>, fallback: &str) -> String {
    match requested {
        Some(value) if allowed.iter().any(|a| a == value) => value.to_string(),
        _ => fallback.to_string(),
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            config_path: data_dir.join("settings.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str::<Settings>(&content) {
                    Ok(mut settings) => {
                        settings.ensure_done_status();
                        return settings;
                    }
                    Err(e) => log::warn!(
                        "Ignoring unreadable settings file {:?}: {}",
                        self.config_path,
                        e
                    ),
                },
                Err(e) => log::warn!("Failed to read {:?}: {}", self.config_path, e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
