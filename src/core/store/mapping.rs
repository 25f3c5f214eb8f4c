//! Conversion between records and SharePoint list item columns.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Map, Value};

use crate::core::lifecycle::clamp_progress;
use crate::core::model::{
    parse_date_str, split_tags, value_as_f64, DeadlineType, SchedulingMode, Task, TeamMember,
    DEFAULT_WEEKLY_HOURS,
};

/// Column values of a list item; accepts either a full item or bare fields.
fn fields_of(item: &Value) -> &Value {
    item.get("fields").unwrap_or(item)
}

fn text(fields: &Value, column: &str) -> String {
    match fields.get(column) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn optional_text(fields: &Value, column: &str) -> Option<String> {
    Some(text(fields, column)).filter(|s| !s.is_empty())
}

fn number(fields: &Value, column: &str) -> Option<f64> {
    fields.get(column).and_then(value_as_f64)
}

fn date(fields: &Value, column: &str) -> Option<NaiveDate> {
    fields.get(column).and_then(Value::as_str).and_then(parse_date_str)
}

fn date_value(date: Option<NaiveDate>) -> Value {
    date.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(Value::Null)
}

/// SharePoint item id (the list's own numbering, not the task id).
pub fn item_id(item: &Value) -> Option<String> {
    match item.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// `None` for items without a `TaskId`; those rows are not tasks.
pub fn item_to_task(item: &Value) -> Option<Task> {
    let f = fields_of(item);
    let id = optional_text(f, "TaskId")?;
    let last_updated = item
        .get("lastModifiedDateTime")
        .or_else(|| f.get("Modified"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(Task {
        id,
        name: text(f, "Title"),
        description: text(f, "Description1"),
        assignee: text(f, "Assignee"),
        status: text(f, "Status"),
        priority: text(f, "Priority"),
        deadline_type: DeadlineType::parse_lenient(&text(f, "TaskType")),
        category: text(f, "Category"),
        start: date(f, "StartDate"),
        due: date(f, "DueDate"),
        completed_date: date(f, "CompletedDate"),
        estimated_hours: number(f, "EstHours").unwrap_or(0.0),
        actual_hours: number(f, "ActualHours").unwrap_or(0.0),
        progress: number(f, "Progress").map(clamp_progress).unwrap_or(0),
        tags: split_tags(&text(f, "Tags")),
        mode: SchedulingMode::parse_lenient(&text(f, "Mode")),
        dependency: optional_text(f, "Dependency"),
        last_updated,
    })
}

pub fn task_to_fields(task: &Task) -> Value {
    json!({
        "Title": task.name,
        "TaskId": task.id,
        "Description1": task.description,
        "Assignee": task.assignee,
        "Status": task.status,
        "Priority": task.priority,
        "TaskType": task.deadline_type.as_str(),
        "Category": task.category,
        "StartDate": date_value(task.start),
        "DueDate": date_value(task.due),
        "CompletedDate": date_value(task.completed_date),
        "EstHours": task.estimated_hours,
        "ActualHours": task.actual_hours,
        "Progress": task.progress,
        "Tags": task.tags.join(", "),
        "Mode": task.mode.as_str(),
        "Dependency": task.dependency.clone().unwrap_or_default(),
    })
}

/// Only the columns whose value differs between `before` and `after`.
pub fn changed_fields(before: &Task, after: &Task) -> Value {
    let old = task_to_fields(before);
    let new = task_to_fields(after);
    let mut changed = Map::new();
    if let Value::Object(columns) = new {
        for (column, value) in columns {
            if old.get(&column) != Some(&value) {
                changed.insert(column, value);
            }
        }
    }
    Value::Object(changed)
}

pub fn item_to_member(item: &Value) -> TeamMember {
    let f = fields_of(item);
    let name = text(f, "Title");
    TeamMember {
        id: optional_text(f, "MemberId").unwrap_or_else(|| name.clone()),
        name,
        role: text(f, "Role"),
        hours: number(f, "Hours")
            .filter(|h| *h > 0.0)
            .unwrap_or(DEFAULT_WEEKLY_HOURS),
        email: optional_text(f, "Email"),
    }
}

pub fn member_to_fields(member: &TeamMember) -> Value {
    json!({
        "Title": member.name,
        "MemberId": member.id,
        "Role": member.role,
        "Hours": member.hours,
        "Email": member.email.clone().unwrap_or_default(),
    })
}
