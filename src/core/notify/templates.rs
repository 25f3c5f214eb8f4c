// HTML bodies for alert and lifecycle emails. User text is always escaped.

use crate::core::alerts::{Alert, AlertKind, Escalation};
use crate::core::model::Task;

const FOOTER: &str =
    r#"<hr><p style="color:#94a3b8;font-size:11px">Task Dashboard - automatic notification</p>"#;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn due_label(task: &Task) -> String {
    task.due
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "no due date".to_string())
}

fn or_dash(value: &str) -> String {
    if value.trim().is_empty() {
        "-".to_string()
    } else {
        escape_html(value)
    }
}

fn row(label: &str, value: &str) -> String {
    format!(
        r#"<tr><td style="padding:4px 12px 4px 0;color:#64748b">{label}:</td><td style="padding:4px 0">{value}</td></tr>"#
    )
}

fn heading(color: &str, text: &str) -> String {
    format!(r#"<h2 style="color:{color}">{text}</h2>"#)
}

fn task_line(task: &Task) -> String {
    format!(
        "<p><strong>{}</strong> - {}</p>",
        escape_html(&task.id),
        escape_html(&task.name)
    )
}

/// Subject and body for an alert email.
pub fn alert_email(task: &Task, alert: &Alert, escalation: Option<Escalation>) -> (String, String) {
    let name = &task.name;
    match alert.kind {
        AlertKind::Overdue => {
            let level = escalation
                .map(|e| format!("<p>Escalation: level {} ({})</p>", e.level, e.label()))
                .unwrap_or_default();
            (
                format!("[ALERT] Overdue: {name}"),
                format!(
                    "{}{}<p>Due: <strong>{}</strong> ({} days late) | Assignee: {} | Progress: {}%</p><p>Category: {}</p>{}{}",
                    heading("#ef4444", "Overdue task"),
                    task_line(task),
                    due_label(task),
                    alert.days.unwrap_or_default(),
                    or_dash(&task.assignee),
                    task.progress,
                    or_dash(&task.category),
                    level,
                    FOOTER
                ),
            )
        }
        AlertKind::DeadlineSoon => (
            format!("[Reminder] Deadline: {name}"),
            format!(
                "{}{}<p>Due: <strong>{}</strong> | Assignee: {} | Progress: {}%</p>{}",
                heading("#eab308", "Deadline approaching"),
                task_line(task),
                due_label(task),
                or_dash(&task.assignee),
                task.progress,
                FOOTER
            ),
        ),
        AlertKind::Blocked => (
            format!("[BLOCKED] {name}"),
            format!(
                "{}{}<p>Assignee: {} | Dependency: {}</p>{}",
                heading("#f97316", "Blocked task"),
                task_line(task),
                or_dash(&task.assignee),
                or_dash(task.dependency.as_deref().unwrap_or("")),
                FOOTER
            ),
        ),
        AlertKind::Stale | AlertKind::AtRisk => (
            format!("[{}] {name}", alert.kind.display_name()),
            format!(
                "{}{}<p>{}</p><p>Assignee: {} | Progress: {}% | Due: {}</p>{}",
                heading("#8b5cf6", &escape_html(&alert.label())),
                task_line(task),
                escape_html(alert.kind.description()),
                or_dash(&task.assignee),
                task.progress,
                due_label(task),
                FOOTER
            ),
        ),
    }
}

pub fn created_email(task: &Task) -> (String, String) {
    let mut rows = vec![
        row("Assignee", &format!("<strong>{}</strong>", or_dash(&task.assignee))),
        row("Priority", &escape_html(&task.priority)),
        row("Category", &escape_html(&task.category)),
        row("Due", &due_label(task)),
    ];
    if !task.description.trim().is_empty() {
        rows.push(row("Description", &escape_html(&task.description)));
    }
    (
        format!("[New task] {}", task.name),
        format!(
            r#"{}<p>Task <strong>{}</strong> - {} was created</p><table style="border-collapse:collapse;font-size:14px;margin:12px 0">{}</table>{}"#,
            heading("#3b82f6", "New task"),
            escape_html(&task.id),
            escape_html(&task.name),
            rows.concat(),
            FOOTER
        ),
    )
}

pub fn assigned_email(task: &Task) -> (String, String) {
    let rows = [
        row("Priority", &escape_html(&task.priority)),
        row("Category", &escape_html(&task.category)),
        row("Due", &due_label(task)),
        row("Progress", &format!("{}%", task.progress)),
    ];
    (
        format!("[Assigned] {}", task.name),
        format!(
            r#"{}{}<table style="border-collapse:collapse;font-size:14px;margin:12px 0">{}</table>{}"#,
            heading("#8b5cf6", "A task was assigned to you"),
            task_line(task),
            rows.concat(),
            FOOTER
        ),
    )
}

/// `color` comes from the configured status colors.
pub fn status_changed_email(task: &Task, old_status: Option<&str>, color: &str) -> (String, String) {
    let status = escape_html(&task.status);
    let transition = match old_status {
        Some(old) => format!(
            r#"<p>Status: <span style="color:#94a3b8">{}</span> -&gt; <strong style="color:{color}">{status}</strong></p>"#,
            escape_html(old)
        ),
        None => format!(r#"<p>New status: <strong style="color:{color}">{status}</strong></p>"#),
    };
    (
        format!("[Status] {} -> {}", task.name, task.status),
        format!(
            "{}{}{}<p>Assignee: {} | Progress: {}% | Due: {}</p>{}",
            heading(color, "Task status changed"),
            task_line(task),
            transition,
            or_dash(&task.assignee),
            task.progress,
            due_label(task),
            FOOTER
        ),
    )
}

pub fn test_email() -> (String, String) {
    (
        "[Test] Task Dashboard notifications".to_string(),
        format!(
            "{}<p>Email delivery is configured correctly.</p>{}",
            heading("#22c55e", "Test message"),
            FOOTER
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::Severity;

    fn task() -> Task {
        serde_json::from_value(serde_json::json!({
            "id": "TASK-004",
            "name": "Fix <script>",
            "assignee": "Anna & Co",
            "status": "Blocked",
            "priority": "High",
            "due": "2024-06-10",
            "dep": "TASK-001"
        }))
        .unwrap()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_alert_email_escapes_user_text() {
        let alert = Alert::new(AlertKind::Blocked, Severity::High);
        let (subject, html) = alert_email(&task(), &alert, None);
        assert_eq!(subject, "[BLOCKED] Fix <script>");
        assert!(html.contains("Fix &lt;script&gt;"));
        assert!(html.contains("Anna &amp; Co"));
        assert!(html.contains("TASK-001"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_overdue_email_mentions_escalation() {
        let alert = Alert::new(AlertKind::Overdue, Severity::Critical).with_days(9);
        let (subject, html) = alert_email(&task(), &alert, Some(Escalation::for_days_overdue(9)));
        assert!(subject.starts_with("[ALERT] Overdue"));
        assert!(html.contains("9 days late"));
        assert!(html.contains("level 4"));
    }

    #[test]
    fn test_status_changed_shows_transition() {
        let (subject, html) = status_changed_email(&task(), Some("In Progress"), "#ef4444");
        assert_eq!(subject, "[Status] Fix <script> -> Blocked");
        assert!(html.contains("In Progress"));
        assert!(html.contains("color:#ef4444"));
    }

    #[test]
    fn test_created_email_skips_empty_description() {
        let (_, html) = created_email(&task());
        assert!(!html.contains("Description"));
    }
}
