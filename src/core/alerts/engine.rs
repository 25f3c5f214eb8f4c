// Alert engine - decides which alert emails go out and dispatches them.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::model::{Alert, AlertKind, AlertLevel, AlertReport, AlertRuleConfig, Escalation};
use super::triggers::derive_alerts;
use crate::core::config::Settings;
use crate::core::model::{Task, TeamMember};
use crate::core::notify::templates;
use crate::core::notify::{EmailMessage, Mailer};

/// Deadline-soon emails only go out this close to the due date.
pub const DEADLINE_EMAIL_DAYS: i64 = 1;

/// Alert engine configuration - persisted in settings.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertEngineConfig {
    /// Per-rule configuration (enabled, email)
    #[serde(default)]
    pub rules: HashMap<AlertKind, AlertRuleConfig>,
}

impl AlertEngineConfig {
    /// Create config with all rules enabled at default settings
    pub fn default_enabled() -> Self {
        let rules = AlertKind::all()
            .iter()
            .map(|kind| (*kind, AlertRuleConfig::for_kind(*kind)))
            .collect();
        Self { rules }
    }

    /// Rules missing from the map use their defaults.
    fn rule(&self, kind: AlertKind) -> AlertRuleConfig {
        self.rules
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| AlertRuleConfig::for_kind(kind))
    }

    /// Check if a specific rule is enabled
    pub fn is_enabled(&self, kind: AlertKind) -> bool {
        self.rule(kind).enabled
    }

    /// Check if scheduled checks email for this rule
    pub fn emails(&self, kind: AlertKind) -> bool {
        let rule = self.rule(kind);
        rule.enabled && rule.email
    }
}

/// Fixed addresses copied on alert emails.
#[derive(Debug, Clone, Default)]
pub struct AlertRecipients {
    pub project_lead: Option<String>,
    pub manager: Option<String>,
}

/// One email the engine decided to send.
#[derive(Debug, Clone)]
pub struct PlannedAlert {
    pub task: Task,
    pub alert: Alert,
    pub escalation: Option<Escalation>,
    pub recipients: Vec<String>,
}

impl PlannedAlert {
    pub fn message(&self) -> EmailMessage {
        let (subject, html) = templates::alert_email(&self.task, &self.alert, self.escalation);
        EmailMessage::new(self.recipients.iter().cloned(), subject, html)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

/// Alert engine state
pub struct AlertEngine {
    config: AlertEngineConfig,
}

impl AlertEngine {
    pub fn new(config: AlertEngineConfig) -> Self {
        Self { config }
    }

    /// Classification of one task with disabled rules removed.
    pub fn evaluate(&self, task: &Task, today: NaiveDate, settings: &Settings) -> AlertReport {
        let mut report = derive_alerts(task, today, &settings.workflow);
        report.alerts.retain(|alert| self.config.is_enabled(alert.kind));
        report.level = report
            .primary()
            .map(|alert| AlertLevel::from(alert.kind))
            .unwrap_or(AlertLevel::Ok);
        report
    }

    /// Work out the emails for one run. Pure: nothing is sent here.
    pub fn plan(
        &self,
        tasks: &[Task],
        team: &[TeamMember],
        today: NaiveDate,
        settings: &Settings,
        recipients: &AlertRecipients,
    ) -> Vec<PlannedAlert> {
        let email_by_name: HashMap<&str, &str> = team
            .iter()
            .filter_map(|m| m.contact().map(|email| (m.name.as_str(), email)))
            .collect();

        let mut planned = Vec::new();
        for task in tasks {
            let report = self.evaluate(task, today, settings);
            let assignee_email = email_by_name.get(task.assignee.as_str()).copied();

            for alert in &report.alerts {
                if !self.config.emails(alert.kind) {
                    continue;
                }
                let include_manager = match alert.kind {
                    AlertKind::Overdue => match report.escalation {
                        Some(esc) if esc.sends_email() => esc.includes_manager(),
                        _ => continue,
                    },
                    AlertKind::DeadlineSoon => {
                        if alert.days.map_or(true, |d| d > DEADLINE_EMAIL_DAYS) {
                            continue;
                        }
                        false
                    }
                    _ => false,
                };

                let mut to: Vec<String> = Vec::new();
                to.extend(recipients.project_lead.clone());
                to.extend(assignee_email.map(str::to_string));
                if include_manager {
                    to.extend(recipients.manager.clone());
                }
                if to.is_empty() {
                    log::debug!("No recipients for {} alert on {}", alert.kind.as_str(), task.id);
                    continue;
                }

                planned.push(PlannedAlert {
                    task: task.clone(),
                    alert: alert.clone(),
                    escalation: report.escalation,
                    recipients: to,
                });
            }
        }
        planned
    }

    /// Send every planned email; failures are logged and counted.
    pub async fn dispatch(&self, plan: &[PlannedAlert], mailer: &dyn Mailer) -> DispatchReport {
        let mut report = DispatchReport::default();
        for item in plan {
            let message = item.message();
            if message.is_empty() {
                continue;
            }
            match mailer.send(&message).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    log::error!(
                        "Failed to send {} alert for {}: {}",
                        item.alert.kind.as_str(),
                        item.task.id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        log::info!("Alert run finished: {} sent, {} failed", report.sent, report.failed);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{Error, Result};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
    }

    fn task(id: &str, status: &str, due_in: i64, assignee: &str) -> Task {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("Task {id}"),
            "assignee": assignee,
            "status": status,
            "priority": "High",
            "due": (today() + Duration::days(due_in)).to_string(),
            "progress": 10
        }))
        .unwrap()
    }

    fn member(name: &str, email: Option<&str>) -> TeamMember {
        TeamMember {
            id: name.to_lowercase(),
            name: name.to_string(),
            role: "Analyst".to_string(),
            hours: 40.0,
            email: email.map(str::to_string),
        }
    }

    fn recipients() -> AlertRecipients {
        AlertRecipients {
            project_lead: Some("pm@example.com".to_string()),
            manager: Some("boss@example.com".to_string()),
        }
    }

    fn plan(tasks: &[Task]) -> Vec<PlannedAlert> {
        let team = vec![member("Anna", Some("anna@example.com")), member("Piotr", None)];
        AlertEngine::new(AlertEngineConfig::default_enabled()).plan(
            tasks,
            &team,
            today(),
            &Settings::default(),
            &recipients(),
        )
    }

    #[test]
    fn test_default_config_enables_everything() {
        let config = AlertEngineConfig::default_enabled();
        for kind in AlertKind::all() {
            assert!(config.is_enabled(*kind));
        }
        assert!(config.emails(AlertKind::Blocked));
        assert!(!config.emails(AlertKind::Stale));
    }

    #[test]
    fn test_missing_rule_uses_defaults() {
        let config = AlertEngineConfig::default();
        assert!(config.is_enabled(AlertKind::AtRisk));
        assert!(config.emails(AlertKind::Overdue));
    }

    #[test]
    fn test_overdue_recipients_follow_escalation() {
        let planned = plan(&[task("T-1", "To Do", -1, "Anna"), task("T-2", "To Do", -3, "Anna")]);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].recipients, vec!["pm@example.com", "anna@example.com"]);
        assert_eq!(
            planned[1].recipients,
            vec!["pm@example.com", "anna@example.com", "boss@example.com"]
        );
    }

    #[test]
    fn test_deadline_soon_emails_only_within_a_day() {
        let planned = plan(&[
            task("T-1", "To Do", 0, "Anna"),
            task("T-2", "To Do", 1, "Anna"),
            task("T-3", "To Do", 2, "Anna"),
        ]);
        let ids: Vec<_> = planned.iter().map(|p| p.task.id.as_str()).collect();
        assert_eq!(ids, vec!["T-1", "T-2"]);
        assert!(planned.iter().all(|p| p.alert.kind == AlertKind::DeadlineSoon));
    }

    #[test]
    fn test_blocked_and_overdue_both_email() {
        let planned = plan(&[task("T-1", "Blocked", -8, "Piotr")]);
        let kinds: Vec<_> = planned.iter().map(|p| p.alert.kind).collect();
        assert_eq!(kinds, vec![AlertKind::Blocked, AlertKind::Overdue]);
        // Piotr has no email: only the fixed addresses remain
        assert_eq!(planned[0].recipients, vec!["pm@example.com"]);
        assert_eq!(planned[1].recipients, vec!["pm@example.com", "boss@example.com"]);
    }

    #[test]
    fn test_done_and_healthy_tasks_are_skipped() {
        assert!(plan(&[task("T-1", "Done", -10, "Anna"), task("T-2", "To Do", 14, "Anna")]).is_empty());
    }

    #[test]
    fn test_disabled_rule_is_not_emailed() {
        let mut config = AlertEngineConfig::default_enabled();
        config.rules.insert(
            AlertKind::Blocked,
            AlertRuleConfig {
                enabled: false,
                email: true,
            },
        );
        let planned = AlertEngine::new(config).plan(
            &[task("T-1", "Blocked", 10, "Anna")],
            &[],
            today(),
            &Settings::default(),
            &recipients(),
        );
        assert!(planned.is_empty());
    }

    #[test]
    fn test_evaluate_drops_disabled_rules() {
        let mut config = AlertEngineConfig::default_enabled();
        config.rules.insert(
            AlertKind::Blocked,
            AlertRuleConfig {
                enabled: false,
                email: false,
            },
        );
        let engine = AlertEngine::new(config);
        let report = engine.evaluate(&task("T-1", "Blocked", -2, "Anna"), today(), &Settings::default());
        assert_eq!(report.level, AlertLevel::Overdue);
        assert_eq!(report.alerts.len(), 1);

        let quiet = engine.evaluate(&task("T-2", "Blocked", 30, "Anna"), today(), &Settings::default());
        assert!(quiet.is_ok());
    }

    #[test]
    fn test_no_recipients_no_email() {
        let planned = AlertEngine::new(AlertEngineConfig::default_enabled()).plan(
            &[task("T-1", "Blocked", 10, "Nobody")],
            &[],
            today(),
            &Settings::default(),
            &AlertRecipients::default(),
        );
        assert!(planned.is_empty());
    }

    struct FlakyMailer {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            if message.subject.contains("T-2") {
                return Err(Error::Graph {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            self.sent.lock().unwrap().push(message.subject.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_counts_failures() {
        let planned = plan(&[task("T-1", "Blocked", 10, "Anna"), task("T-2", "Blocked", 10, "Anna")]);
        let mailer = FlakyMailer {
            sent: Mutex::new(Vec::new()),
        };
        let engine = AlertEngine::new(AlertEngineConfig::default_enabled());
        let report = engine.dispatch(&planned, &mailer).await;
        assert_eq!(report, DispatchReport { sent: 1, failed: 1 });
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }
}
