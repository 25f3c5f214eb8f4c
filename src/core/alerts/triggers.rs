// Trigger evaluation logic for alert rules.
//
// Each trigger looks at one task on one day and returns an optional alert
// when its condition is met. `derive_alerts` runs them in priority order.

use chrono::NaiveDate;

use super::model::{Alert, AlertKind, AlertLevel, AlertReport, Escalation, Severity};
use crate::core::config::WorkflowStatuses;
use crate::core::lifecycle::business_day;
use crate::core::model::Task;

/// Due within this many days (inclusive) counts as "deadline soon".
pub const DEADLINE_SOON_DAYS: i64 = 2;
/// In-progress tasks untouched for longer than this are stale.
pub const STALE_AFTER_DAYS: i64 = 3;
/// At risk when progress is below this share of the expected progress...
pub const AT_RISK_RATIO: f64 = 0.6;
/// ...and the schedule expects more than this many percent.
pub const AT_RISK_MIN_EXPECTED: f64 = 20.0;

/// Context provided to triggers for evaluation
pub struct TriggerContext<'a> {
    pub task: &'a Task,
    pub today: NaiveDate,
    pub workflow: &'a WorkflowStatuses,
    /// Days from today to the due date, negative when overdue
    pub days_until_due: Option<i64>,
}

impl<'a> TriggerContext<'a> {
    pub fn new(task: &'a Task, today: NaiveDate, workflow: &'a WorkflowStatuses) -> Self {
        Self {
            task,
            today,
            workflow,
            days_until_due: task.days_until_due(today),
        }
    }

    fn in_progress(&self) -> bool {
        self.task.status == self.workflow.in_progress
    }
}

/// Evaluate a specific trigger against the current context.
pub fn evaluate_trigger(kind: AlertKind, ctx: &TriggerContext) -> Option<Alert> {
    match kind {
        AlertKind::Blocked => evaluate_blocked(ctx),
        AlertKind::Overdue => evaluate_overdue(ctx),
        AlertKind::DeadlineSoon => evaluate_deadline_soon(ctx),
        AlertKind::Stale => evaluate_stale(ctx),
        AlertKind::AtRisk => evaluate_at_risk(ctx),
    }
}

/// Classify a task. Done tasks are always ok; otherwise every rule is
/// evaluated and the first match decides the displayed level.
pub fn derive_alerts(task: &Task, today: NaiveDate, workflow: &WorkflowStatuses) -> AlertReport {
    if task.is_done(&workflow.done) {
        return AlertReport::ok();
    }

    let ctx = TriggerContext::new(task, today, workflow);
    let alerts: Vec<Alert> = AlertKind::all()
        .iter()
        .filter_map(|kind| evaluate_trigger(*kind, &ctx))
        .collect();

    let escalation = match ctx.days_until_due {
        Some(days) if days <= 0 => Some(Escalation::for_days_overdue(-days)),
        _ => None,
    };

    match alerts.first() {
        Some(primary) => AlertReport {
            level: AlertLevel::from(primary.kind),
            alerts,
            escalation,
        },
        None => AlertReport {
            escalation,
            ..AlertReport::ok()
        },
    }
}

fn evaluate_blocked(ctx: &TriggerContext) -> Option<Alert> {
    (ctx.task.status == ctx.workflow.blocked).then(|| Alert::new(AlertKind::Blocked, Severity::High))
}

fn evaluate_overdue(ctx: &TriggerContext) -> Option<Alert> {
    let days_late = -ctx.days_until_due.filter(|d| *d < 0)?;
    let severity = match days_late {
        d if d >= 7 => Severity::Critical,
        d if d >= 3 => Severity::High,
        _ => Severity::Medium,
    };
    Some(Alert::new(AlertKind::Overdue, severity).with_days(days_late))
}

fn evaluate_deadline_soon(ctx: &TriggerContext) -> Option<Alert> {
    let days_left = ctx
        .days_until_due
        .filter(|d| (0..=DEADLINE_SOON_DAYS).contains(d))?;
    let severity = if days_left == 0 {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(Alert::new(AlertKind::DeadlineSoon, severity).with_days(days_left))
}

fn evaluate_stale(ctx: &TriggerContext) -> Option<Alert> {
    if !ctx.in_progress() {
        return None;
    }
    let last_updated = business_day(ctx.task.last_updated?);
    let idle_days = (ctx.today - last_updated).num_days();
    (idle_days > STALE_AFTER_DAYS)
        .then(|| Alert::new(AlertKind::Stale, Severity::Medium).with_days(idle_days))
}

fn evaluate_at_risk(ctx: &TriggerContext) -> Option<Alert> {
    if !ctx.in_progress() {
        return None;
    }
    let (start, due) = (ctx.task.start?, ctx.task.due?);
    let window = (due - start).num_days();
    if window <= 0 {
        return None;
    }
    let elapsed = (ctx.today - start).num_days().max(0);
    let expected = elapsed as f64 / window as f64 * 100.0;
    if expected > AT_RISK_MIN_EXPECTED && f64::from(ctx.task.progress) < expected * AT_RISK_RATIO {
        let mut alert = Alert::new(AlertKind::AtRisk, Severity::Medium);
        alert.expected_progress = Some(expected.round() as u32);
        return Some(alert);
    }
    None
}
