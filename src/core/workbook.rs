//! Spreadsheet export and import of the task list.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use chrono::{NaiveDate, TimeDelta};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde_json::{Map, Value};

use super::analysis::Kpis;
use super::config::Settings;
use super::error::{Error, Result};
use super::model::{LogEntry, Task, TaskDraft, TeamMember};

/// Wire field and column header of the task sheet, in column order.
pub const TASK_COLUMNS: &[(&str, &str)] = &[
    ("id", "Task ID"),
    ("name", "Task name"),
    ("description", "Description"),
    ("assignee", "Assignee"),
    ("status", "Status"),
    ("priority", "Priority"),
    ("type", "Deadline type"),
    ("category", "Category"),
    ("start", "Start date"),
    ("due", "Due date"),
    ("completedDate", "Completed date"),
    ("est", "Estimated (h)"),
    ("actual", "Actual (h)"),
    ("progress", "Progress %"),
    ("tags", "Tags"),
    ("dep", "Dependency"),
    ("mode", "Mode"),
];

const DATE_FIELDS: &[&str] = &["start", "due", "completedDate"];
const NUMBER_FIELDS: &[&str] = &["est", "actual", "progress"];
/// Only the newest entries go into the Log sheet.
pub const LOG_EXPORT_LIMIT: usize = 200;

pub struct ExportData<'a> {
    pub tasks: &'a [Task],
    pub team: &'a [TeamMember],
    pub settings: &'a Settings,
    pub kpis: &'a Kpis,
    pub log: &'a [LogEntry],
}

pub fn export_filename(today: NaiveDate) -> String {
    format!("tasks_{}.xlsx", today.format("%Y-%m-%d"))
}

fn date_text(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn write_header(sheet: &mut Worksheet, headers: &[&str], bold: &Format) -> Result<()> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, bold)?;
    }
    Ok(())
}

fn write_key_values(
    workbook: &mut Workbook,
    name: &str,
    headers: [&str; 2],
    rows: &[(String, f64)],
    bold: &Format,
) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;
    write_header(sheet, &headers, bold)?;
    for (i, (key, value)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, key)?;
        sheet.write_number(row, 1, *value)?;
    }
    Ok(())
}

fn write_tasks(workbook: &mut Workbook, tasks: &[Task], bold: &Format) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Tasks")?;
    let headers: Vec<&str> = TASK_COLUMNS.iter().map(|(_, h)| *h).collect();
    write_header(sheet, &headers, bold)?;

    for (i, task) in tasks.iter().enumerate() {
        let row = i as u32 + 1;
        let text_cells = [
            (0, task.id.clone()),
            (1, task.name.clone()),
            (2, task.description.clone()),
            (3, task.assignee.clone()),
            (4, task.status.clone()),
            (5, task.priority.clone()),
            (6, task.deadline_type.as_str().to_string()),
            (7, task.category.clone()),
            (8, date_text(task.start)),
            (9, date_text(task.due)),
            (10, date_text(task.completed_date)),
            (14, task.tags.join(", ")),
            (15, task.dependency.clone().unwrap_or_default()),
            (16, task.mode.as_str().to_string()),
        ];
        for (col, value) in &text_cells {
            sheet.write_string(row, *col, value)?;
        }
        sheet.write_number(row, 11, task.estimated_hours)?;
        sheet.write_number(row, 12, task.actual_hours)?;
        sheet.write_number(row, 13, f64::from(task.progress))?;
    }
    Ok(())
}

fn write_team(workbook: &mut Workbook, team: &[TeamMember], bold: &Format) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Team")?;
    write_header(sheet, &["ID", "Name", "Role", "Hours/week", "Email"], bold)?;
    for (i, member) in team.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, &member.id)?;
        sheet.write_string(row, 1, &member.name)?;
        sheet.write_string(row, 2, &member.role)?;
        sheet.write_number(row, 3, member.hours)?;
        sheet.write_string(row, 4, member.email.as_deref().unwrap_or(""))?;
    }
    Ok(())
}

fn write_categories(workbook: &mut Workbook, categories: &[String], bold: &Format) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Categories")?;
    write_header(sheet, &["Category"], bold)?;
    for (i, category) in categories.iter().enumerate() {
        sheet.write_string(i as u32 + 1, 0, category)?;
    }
    Ok(())
}

fn log_value(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

fn write_log(workbook: &mut Workbook, log: &[LogEntry], bold: &Format) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Log")?;
    if log.is_empty() {
        write_header(sheet, &["Info"], bold)?;
        sheet.write_string(1, 0, "No entries")?;
        return Ok(());
    }
    write_header(
        sheet,
        &["Task ID", "Action", "Field", "Old value", "New value", "Time"],
        bold,
    )?;
    let start = log.len().saturating_sub(LOG_EXPORT_LIMIT);
    for (i, entry) in log[start..].iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, entry.task_id.as_deref().unwrap_or(""))?;
        sheet.write_string(row, 1, entry.action_label())?;
        sheet.write_string(row, 2, entry.field.as_deref().unwrap_or(""))?;
        sheet.write_string(row, 3, log_value(&entry.old_value))?;
        sheet.write_string(row, 4, log_value(&entry.new_value))?;
        sheet.write_string(row, 5, entry.timestamp.to_rfc3339())?;
    }
    Ok(())
}

/// Build the full workbook: Tasks, Team, Categories, Settings, Dashboard, Log.
pub fn export_workbook(data: &ExportData) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    write_tasks(&mut workbook, data.tasks, &bold)?;
    write_team(&mut workbook, data.team, &bold)?;
    write_categories(&mut workbook, &data.settings.categories, &bold)?;

    let mut settings_rows: Vec<(String, f64)> = data
        .settings
        .wip_limits
        .iter()
        .map(|(status, limit)| (format!("WIP {status}"), f64::from(*limit)))
        .collect();
    let rag = &data.settings.rag_thresholds;
    settings_rows.push(("RAG green (%)".to_string(), rag.green));
    settings_rows.push(("RAG yellow (%)".to_string(), rag.yellow));
    settings_rows.push(("RAG orange (%)".to_string(), rag.orange));
    write_key_values(&mut workbook, "Settings", ["Key", "Value"], &settings_rows, &bold)?;

    let kpis = data.kpis;
    let dashboard_rows = vec![
        ("Total tasks".to_string(), kpis.total as f64),
        ("Active".to_string(), kpis.active as f64),
        ("Done".to_string(), kpis.done as f64),
        ("Overdue".to_string(), kpis.overdue as f64),
        ("Blocked".to_string(), kpis.blocked as f64),
        ("Remaining hours".to_string(), kpis.remaining_hours),
    ];
    write_key_values(&mut workbook, "Dashboard", ["Metric", "Value"], &dashboard_rows, &bold)?;

    write_log(&mut workbook, data.log, &bold)?;

    Ok(workbook.save_to_buffer()?)
}

/// One task row read from a spreadsheet.
#[derive(Debug, Clone)]
pub struct ImportedRow {
    /// Spreadsheet row number, 1-based with the header on row 1
    pub row: usize,
    pub draft: TaskDraft,
}

#[derive(Debug, Default)]
pub struct ParsedImport {
    pub rows: Vec<ImportedRow>,
    pub errors: Vec<String>,
}

/// Days since 1899-12-30, the spreadsheet epoch, to a calendar date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(TimeDelta::try_days(serial.floor() as i64)?)
}

/// Header cell to wire field; accepts our headers and raw field names.
fn field_for_header(header: &str) -> Option<&'static str> {
    let header = header.trim();
    TASK_COLUMNS
        .iter()
        .find(|(field, label)| label.eq_ignore_ascii_case(header) || field.eq_ignore_ascii_case(header))
        .map(|(field, _)| *field)
}

fn cell_value(field: &str, cell: &Data) -> Option<Value> {
    let is_date = DATE_FIELDS.contains(&field);
    let is_number = NUMBER_FIELDS.contains(&field);
    let number = |n: f64| {
        if is_date {
            if n < 1.0 {
                return None;
            }
            // Out-of-range serials are passed through so the row reports an invalid date
            Some(Value::String(serial_to_date(n).map_or_else(
                || n.to_string(),
                |d| d.format("%Y-%m-%d").to_string(),
            )))
        } else if is_number {
            serde_json::Number::from_f64(n).map(Value::Number)
        } else if n.fract() == 0.0 {
            Some(Value::String(format!("{}", n as i64)))
        } else {
            Some(Value::String(n.to_string()))
        }
    };
    match cell {
        Data::Empty => None,
        Data::String(s) if s.trim().is_empty() => None,
        Data::String(s) => Some(Value::String(s.trim().to_string())),
        Data::Int(i) => number(*i as f64),
        Data::Float(f) => number(*f),
        Data::Bool(b) => Some(Value::String(b.to_string())),
        Data::DateTime(dt) => number(dt.as_f64()),
        Data::DateTimeIso(s) => Some(Value::String(s.clone())),
        _ => None,
    }
}

/// Read the task sheet: the first sheet whose name mentions "tasks", else
/// the first sheet.
pub fn parse_task_sheet(bytes: &[u8]) -> Result<ParsedImport> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))?;
    let names = workbook.sheet_names();
    let sheet = names
        .iter()
        .find(|n| n.to_lowercase().contains("tasks"))
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| Error::Workbook("workbook has no sheets".to_string()))?;
    let range = workbook.worksheet_range(&sheet)?;

    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range.rows();
    let headers: Vec<Option<&'static str>> = match rows.next() {
        Some(cells) => cells
            .iter()
            .map(|c| match c {
                Data::String(s) => field_for_header(s),
                _ => None,
            })
            .collect(),
        None => return Ok(ParsedImport::default()),
    };

    let mut parsed = ParsedImport::default();
    for (i, cells) in rows.enumerate() {
        let row_number = first_row + i + 2;
        if cells.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let mut fields = Map::new();
        for (field, cell) in headers.iter().zip(cells) {
            let Some(field) = field else { continue };
            if let Some(value) = cell_value(field, cell) {
                fields.insert((*field).to_string(), value);
            }
        }
        let has_name = fields
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|n| !n.trim().is_empty());
        if !has_name {
            parsed.errors.push(format!("Row {row_number}: missing task name"));
            continue;
        }
        match serde_json::from_value::<TaskDraft>(Value::Object(fields)) {
            Ok(draft) => parsed.rows.push(ImportedRow {
                row: row_number,
                draft,
            }),
            Err(e) => parsed.errors.push(format!("Row {row_number}: {e}")),
        }
    }
    Ok(parsed)
}
