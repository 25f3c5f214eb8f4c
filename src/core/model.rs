//! Task and team member records as stored and served to the dashboard.
//!
//! Wire names are camelCase because the dashboard frontend and existing
//! `data.json` files use them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_TASK_NAME: &str = "New task";
pub const DEFAULT_WEEKLY_HOURS: f64 = 40.0;

/// How binding a task's due date is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadlineType {
    /// External, non-negotiable deadline
    Deadline,
    /// Target date declared by the assignee
    #[default]
    Declared,
}

impl DeadlineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deadline => "DEADLINE",
            Self::Declared => "DECLARED",
        }
    }

    /// Anything other than `DEADLINE` is a declared date.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("DEADLINE") {
            Self::Deadline
        } else {
            Self::Declared
        }
    }
}

impl<'de> Deserialize<'de> for DeadlineType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| Self::parse_lenient(&s)).unwrap_or_default())
    }
}

/// How the work is spread over the start..due window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMode {
    /// Worked on without interruption
    Continuous,
    /// Spread across the whole window
    #[default]
    Distributed,
}

impl SchedulingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Distributed => "distributed",
        }
    }

    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("continuous") {
            Self::Continuous
        } else {
            Self::Distributed
        }
    }
}

impl<'de> Deserialize<'de> for SchedulingMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| Self::parse_lenient(&s)).unwrap_or_default())
    }
}

/// A tracked unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Human-readable identifier (`TASK-007`)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Team member name, empty when unassigned
    #[serde(default)]
    pub assignee: String,
    pub status: String,
    pub priority: String,
    #[serde(rename = "type", default)]
    pub deadline_type: DeadlineType,
    #[serde(default)]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub due: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub completed_date: Option<NaiveDate>,
    /// Estimated effort in hours
    #[serde(rename = "est", default)]
    pub estimated_hours: f64,
    /// Hours booked so far
    #[serde(rename = "actual", default)]
    pub actual_hours: f64,
    /// Completion percentage, 0..=100
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mode: SchedulingMode,
    /// Identifier of the task this one waits on
    #[serde(rename = "dep", default)]
    pub dependency: Option<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_done(&self, done_status: &str) -> bool {
        self.status == done_status
    }

    /// Estimated hours still outstanding given the current progress.
    pub fn remaining_hours(&self) -> f64 {
        self.estimated_hours * (1.0 - f64::from(self.progress) / 100.0)
    }

    /// Whole days from `today` to the due date; negative when overdue.
    pub fn days_until_due(&self, today: NaiveDate) -> Option<i64> {
        self.due.map(|due| (due - today).num_days())
    }
}

/// A person tasks can be assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    /// Weekly capacity in hours
    #[serde(default = "default_weekly_hours")]
    pub hours: f64,
    #[serde(default)]
    pub email: Option<String>,
}

fn default_weekly_hours() -> f64 {
    DEFAULT_WEEKLY_HOURS
}

impl TeamMember {
    /// Email address if one is set and non-blank.
    pub fn contact(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

/// One field that changed during an update, as JSON values for the log.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: Value,
    pub new: Value,
}

/// Change-log record kept by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    fn bare(timestamp: DateTime<Utc>) -> Self {
        Self {
            task_id: None,
            action: None,
            field: None,
            old_value: None,
            new_value: None,
            imported: None,
            updated: None,
            errors: None,
            timestamp,
        }
    }

    pub fn created(task_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            action: Some("created".to_string()),
            ..Self::bare(at)
        }
    }

    pub fn deleted(task_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            action: Some("deleted".to_string()),
            ..Self::bare(at)
        }
    }

    pub fn changed(task_id: &str, change: FieldChange, at: DateTime<Utc>) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            field: Some(change.field.to_string()),
            old_value: Some(change.old),
            new_value: Some(change.new),
            ..Self::bare(at)
        }
    }

    pub fn import(imported: usize, updated: usize, errors: usize, at: DateTime<Utc>) -> Self {
        Self {
            action: Some("import".to_string()),
            imported: Some(imported),
            updated: Some(updated),
            errors: Some(errors),
            ..Self::bare(at)
        }
    }

    /// Action label for display; field edits have no explicit action.
    pub fn action_label(&self) -> &str {
        self.action.as_deref().unwrap_or("changed")
    }
}

/// Body of a task creation request, also produced by spreadsheet import.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(rename = "type", default)]
    pub deadline_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub due: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub completed_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub est: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub actual: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub progress: Option<f64>,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub dep: Option<String>,
}

/// Partial task update. For nullable fields the outer `Option` says whether
/// the field was sent, the inner one carries an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(rename = "type", default)]
    pub deadline_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "patch_date")]
    pub start: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "patch_date")]
    pub due: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "patch_date")]
    pub completed_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub est: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub actual: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub progress: Option<f64>,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "patch_text")]
    pub dep: Option<Option<String>>,
}

impl TaskPatch {
    /// Wire names of the fields present in this patch.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut mark = |present: bool, name: &'static str| {
            if present {
                fields.push(name);
            }
        };
        mark(self.name.is_some(), "name");
        mark(self.description.is_some(), "description");
        mark(self.assignee.is_some(), "assignee");
        mark(self.status.is_some(), "status");
        mark(self.priority.is_some(), "priority");
        mark(self.deadline_type.is_some(), "type");
        mark(self.category.is_some(), "category");
        mark(self.start.is_some(), "start");
        mark(self.due.is_some(), "due");
        mark(self.completed_date.is_some(), "completedDate");
        mark(self.est.is_some(), "est");
        mark(self.actual.is_some(), "actual");
        mark(self.progress.is_some(), "progress");
        mark(self.tags.is_some(), "tags");
        mark(self.mode.is_some(), "mode");
        mark(self.dep.is_some(), "dep");
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }
}

impl From<&TaskDraft> for TaskPatch {
    /// Upsert path: only the columns a row actually carried are applied.
    fn from(draft: &TaskDraft) -> Self {
        Self {
            name: draft.name.clone(),
            description: draft.description.clone(),
            assignee: draft.assignee.clone(),
            status: draft.status.clone(),
            priority: draft.priority.clone(),
            deadline_type: draft.deadline_type.clone(),
            category: draft.category.clone(),
            start: draft.start.map(Some),
            due: draft.due.map(Some),
            completed_date: draft.completed_date.map(Some),
            est: draft.est,
            actual: draft.actual,
            progress: draft.progress,
            tags: draft.tags.clone(),
            mode: draft.mode.clone(),
            dep: draft.dep.clone().map(Some),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub hours: Option<f64>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub hours: Option<f64>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Next identifier after the highest numeric suffix carrying `prefix`.
pub fn next_task_id(tasks: &[Task], prefix: &str) -> String {
    let max = tasks
        .iter()
        .filter_map(|t| t.id.strip_prefix(prefix))
        .filter_map(|suffix| suffix.trim().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}{:03}", max.saturating_add(1))
}

/// `"Anna  Nowak "` -> `"anna.nowak"`
pub fn member_id_from_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(".")
        .to_lowercase()
}

/// Accepts `YYYY-MM-DD` or any timestamp starting with one.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Numbers and numeric strings; everything else is `None`.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_date_str(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid date: {raw}"))),
    }
}

fn patch_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Option<NaiveDate>>, D::Error> {
    lenient_date(deserializer).map(Some)
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(value_as_f64))
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

fn patch_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Option<String>>, D::Error> {
    lenient_text(deserializer).map(Some)
}

/// Split a comma-separated tag list, dropping blanks.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn lenient_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<String>>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Some(Value::String(s)) => Some(split_tags(&s)),
        _ => None,
    })
}
