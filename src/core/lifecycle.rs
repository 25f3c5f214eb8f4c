//! Task rules shared by both storage backends.
//!
//! Creation defaults and the auto-complete side effects live here so the
//! local file and the remote list produce identical records.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use super::config::Settings;
use super::model::{
    DeadlineType, FieldChange, SchedulingMode, Task, TaskDraft, TaskPatch, DEFAULT_TASK_NAME,
};

/// Wire fields compared when recording changes. `lastUpdated` is left out.
const TRACKED_FIELDS: &[&str] = &[
    "name",
    "description",
    "assignee",
    "status",
    "priority",
    "type",
    "category",
    "start",
    "due",
    "completedDate",
    "est",
    "actual",
    "progress",
    "tags",
    "mode",
    "dep",
];

/// Calendar day used for stored dates and for alert evaluation alike.
pub fn business_day(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

pub fn today() -> NaiveDate {
    business_day(Utc::now())
}

/// Round and clamp a percentage to 0..=100.
pub fn clamp_progress(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Build a full task from a creation request.
pub fn materialize(draft: &TaskDraft, id: String, settings: &Settings, now: DateTime<Utc>) -> Task {
    let today = business_day(now);
    let done = settings.done_status();

    let name = draft
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_TASK_NAME)
        .to_string();

    let mut task = Task {
        id,
        name,
        description: draft.description.clone().unwrap_or_default(),
        assignee: draft.assignee.as_deref().map(str::trim).unwrap_or_default().to_string(),
        status: settings.resolve_status(draft.status.as_deref()),
        priority: settings.resolve_priority(draft.priority.as_deref()),
        deadline_type: draft
            .deadline_type
            .as_deref()
            .map(DeadlineType::parse_lenient)
            .unwrap_or_default(),
        category: settings.resolve_category(draft.category.as_deref()),
        start: Some(draft.start.unwrap_or(today)),
        due: Some(draft.due.unwrap_or(today)),
        completed_date: None,
        estimated_hours: draft.est.unwrap_or(0.0),
        actual_hours: draft.actual.unwrap_or(0.0),
        progress: draft.progress.map(clamp_progress).unwrap_or(0),
        tags: draft.tags.clone().unwrap_or_default(),
        mode: draft
            .mode
            .as_deref()
            .map(SchedulingMode::parse_lenient)
            .unwrap_or_default(),
        dependency: draft.dep.clone(),
        last_updated: Some(now),
    };

    if task.status == done {
        task.progress = 100;
        task.completed_date = Some(draft.completed_date.unwrap_or(today));
    } else if task.progress >= 100 {
        task.status = done.to_string();
        task.completed_date = Some(draft.completed_date.unwrap_or(today));
    }
    task
}

/// Apply a partial update plus the auto-complete rules.
///
/// Returns the fields whose value changed, including ones changed by the
/// rules rather than the caller.
pub fn apply_patch(
    task: &mut Task,
    patch: &TaskPatch,
    done: &str,
    now: DateTime<Utc>,
) -> Vec<FieldChange> {
    let before = task.clone();
    let today = business_day(now);

    if let Some(name) = &patch.name {
        task.name = name.clone();
    }
    if let Some(description) = &patch.description {
        task.description = description.clone();
    }
    if let Some(assignee) = &patch.assignee {
        task.assignee = assignee.trim().to_string();
    }
    if let Some(status) = &patch.status {
        task.status = status.clone();
    }
    if let Some(priority) = &patch.priority {
        task.priority = priority.clone();
    }
    if let Some(kind) = &patch.deadline_type {
        task.deadline_type = DeadlineType::parse_lenient(kind);
    }
    if let Some(category) = &patch.category {
        task.category = category.clone();
    }
    if let Some(start) = patch.start {
        task.start = start;
    }
    if let Some(due) = patch.due {
        task.due = due;
    }
    if let Some(completed) = patch.completed_date {
        task.completed_date = completed;
    }
    if let Some(est) = patch.est {
        task.estimated_hours = est;
    }
    if let Some(actual) = patch.actual {
        task.actual_hours = actual;
    }
    if let Some(progress) = patch.progress {
        task.progress = clamp_progress(progress);
    }
    if let Some(tags) = &patch.tags {
        task.tags = tags.clone();
    }
    if let Some(mode) = &patch.mode {
        task.mode = SchedulingMode::parse_lenient(mode);
    }
    if let Some(dep) = &patch.dep {
        task.dependency = dep.clone();
    }

    let was_done = before.status == done;
    if patch.status.as_deref() == Some(done) && !was_done {
        task.completed_date = Some(today);
        task.progress = 100;
    }
    if patch.progress.is_some() && task.progress >= 100 && task.status != done {
        task.status = done.to_string();
        task.completed_date = patch.completed_date.flatten().or(Some(today));
    }
    if was_done && task.status != done {
        task.completed_date = None;
    }

    task.last_updated = Some(now);
    diff(&before, task)
}

/// Field-by-field comparison on the wire representation.
pub fn diff(before: &Task, after: &Task) -> Vec<FieldChange> {
    let (old, new) = match (serde_json::to_value(before), serde_json::to_value(after)) {
        (Ok(old), Ok(new)) => (old, new),
        _ => return Vec::new(),
    };
    TRACKED_FIELDS
        .iter()
        .filter_map(|field| {
            let old_value = old.get(*field).cloned().unwrap_or(Value::Null);
            let new_value = new.get(*field).cloned().unwrap_or(Value::Null);
            (old_value != new_value).then_some(FieldChange {
                field,
                old: old_value,
                new: new_value,
            })
        })
        .collect()
}
