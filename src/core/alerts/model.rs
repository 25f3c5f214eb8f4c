// Alert model types for task health classification and escalation.
//
// NOTE: the dashboard frontend colours cards by `AlertLevel` strings.
// Keep the snake_case names stable when modifying these enums.

use serde::{Deserialize, Serialize};

/// Alert rules, in the priority order used to pick the displayed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Task sits in the blocked status
    Blocked,
    /// Due date is in the past
    Overdue,
    /// Due today or within the next two days
    DeadlineSoon,
    /// In progress but untouched for more than three days
    Stale,
    /// Progress lags far behind the elapsed share of the schedule
    AtRisk,
}

impl AlertKind {
    /// Get the display name for this alert
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Blocked => "Blocked",
            Self::Overdue => "Overdue",
            Self::DeadlineSoon => "Deadline Soon",
            Self::Stale => "No Progress",
            Self::AtRisk => "At Risk",
        }
    }

    /// Get a description of what this alert does
    pub fn description(&self) -> &'static str {
        match self {
            Self::Blocked => "Task is marked as blocked",
            Self::Overdue => "Task is past its due date and still open",
            Self::DeadlineSoon => "Task is due within the next two days",
            Self::Stale => "Task is in progress but was not updated for more than three days",
            Self::AtRisk => "Progress is well below what the elapsed schedule suggests",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Overdue => "overdue",
            Self::DeadlineSoon => "deadline_soon",
            Self::Stale => "stale",
            Self::AtRisk => "at_risk",
        }
    }

    /// All alert kinds in evaluation order
    pub fn all() -> &'static [AlertKind] {
        &[
            Self::Blocked,
            Self::Overdue,
            Self::DeadlineSoon,
            Self::Stale,
            Self::AtRisk,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

/// One rule that matched a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    /// Days overdue, days left, or days since the last update, depending on kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<i64>,
    /// Progress the schedule expects by today (at-risk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_progress: Option<u32>,
}

impl Alert {
    pub fn new(kind: AlertKind, severity: Severity) -> Self {
        Self {
            kind,
            severity,
            days: None,
            expected_progress: None,
        }
    }

    pub fn with_days(mut self, days: i64) -> Self {
        self.days = Some(days);
        self
    }

    /// Short human-readable label for badges and email subjects.
    pub fn label(&self) -> String {
        match (self.kind, self.days) {
            (AlertKind::Overdue, Some(days)) => format!("Overdue ({days}d)"),
            (AlertKind::DeadlineSoon, Some(0)) => "Due today".to_string(),
            (AlertKind::DeadlineSoon, Some(days)) => format!("Due in {days}d"),
            (AlertKind::Stale, Some(days)) => format!("No progress ({days}d)"),
            _ => self.kind.display_name().to_string(),
        }
    }
}

/// Displayed classification of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Ok,
    Blocked,
    Overdue,
    DeadlineSoon,
    Stale,
    AtRisk,
}

impl From<AlertKind> for AlertLevel {
    fn from(kind: AlertKind) -> Self {
        match kind {
            AlertKind::Blocked => Self::Blocked,
            AlertKind::Overdue => Self::Overdue,
            AlertKind::DeadlineSoon => Self::DeadlineSoon,
            AlertKind::Stale => Self::Stale,
            AlertKind::AtRisk => Self::AtRisk,
        }
    }
}

/// Escalation tier for a task that is due today or overdue.
///
/// 1 = due today, 2 = at least one day late, 3 = three days, 4 = a week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Escalation {
    pub level: u8,
}

impl Escalation {
    pub fn for_days_overdue(days_overdue: i64) -> Self {
        let level = match days_overdue {
            d if d >= 7 => 4,
            d if d >= 3 => 3,
            d if d >= 1 => 2,
            _ => 1,
        };
        Self { level }
    }

    /// Levels from 2 on send email to the assignee and the project lead.
    pub fn sends_email(&self) -> bool {
        self.level >= 2
    }

    /// The top two levels also copy the manager.
    pub fn includes_manager(&self) -> bool {
        self.level >= 3
    }

    pub fn label(&self) -> &'static str {
        match self.level {
            4 => "Critical delay",
            3 => "Needs escalation",
            2 => "Overdue",
            _ => "Due today",
        }
    }
}

/// Full classification of one task on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertReport {
    pub level: AlertLevel,
    /// Every matched rule, in priority order
    pub alerts: Vec<Alert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
}

impl AlertReport {
    pub fn ok() -> Self {
        Self {
            level: AlertLevel::Ok,
            alerts: Vec::new(),
            escalation: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.level == AlertLevel::Ok
    }

    pub fn primary(&self) -> Option<&Alert> {
        self.alerts.first()
    }

    pub fn find(&self, kind: AlertKind) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.kind == kind)
    }
}

/// Per-rule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    /// Rule is evaluated for badges and the alerts view
    pub enabled: bool,
    /// Scheduled checks send email for this rule
    #[serde(default)]
    pub email: bool,
}

impl AlertRuleConfig {
    pub fn for_kind(kind: AlertKind) -> Self {
        Self {
            enabled: true,
            email: matches!(
                kind,
                AlertKind::Blocked | AlertKind::Overdue | AlertKind::DeadlineSoon
            ),
        }
    }
}
