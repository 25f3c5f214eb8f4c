//! Email notifications for task lifecycle events and alerts.

pub mod mailer;
pub mod templates;

use std::sync::Arc;

use serde::Deserialize;

pub use mailer::{EmailMessage, GraphMailer, Mailer};

use super::alerts::AlertRecipients;
use super::config::Settings;
use super::error::{Error, Result};
use super::model::Task;

const DEFAULT_STATUS_COLOR: &str = "#3b82f6";

/// Lifecycle change worth telling the project lead and assignee about.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Created,
    Assigned,
    StatusChanged { old: String },
}

impl TaskEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Assigned => "assigned",
            Self::StatusChanged { .. } => "status_changed",
        }
    }
}

/// Body of a test email request; every part is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestEmail {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Clone, Default)]
pub struct Notifier {
    mailer: Option<Arc<dyn Mailer>>,
    recipients: AlertRecipients,
}

impl Notifier {
    pub fn new(mailer: Option<Arc<dyn Mailer>>, recipients: AlertRecipients) -> Self {
        Self { mailer, recipients }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    pub fn mailer(&self) -> Option<&Arc<dyn Mailer>> {
        self.mailer.as_ref()
    }

    pub fn recipients(&self) -> &AlertRecipients {
        &self.recipients
    }

    /// Build the lifecycle email, or `None` when nobody would receive it.
    pub fn task_message(
        &self,
        task: &Task,
        event: &TaskEvent,
        assignee_email: Option<&str>,
        settings: &Settings,
    ) -> Option<EmailMessage> {
        let (subject, html) = match event {
            TaskEvent::Created => templates::created_email(task),
            TaskEvent::Assigned => templates::assigned_email(task),
            TaskEvent::StatusChanged { old } => {
                let color = settings
                    .status_colors
                    .get(&task.status)
                    .map(String::as_str)
                    .filter(|c| c.starts_with('#') && c.chars().skip(1).all(|ch| ch.is_ascii_hexdigit()))
                    .unwrap_or(DEFAULT_STATUS_COLOR);
                templates::status_changed_email(task, Some(old), color)
            }
        };
        let to = self
            .recipients
            .project_lead
            .iter()
            .cloned()
            .chain(assignee_email.map(str::to_string));
        let message = EmailMessage::new(to, subject, html);
        (!message.is_empty()).then_some(message)
    }

    /// Fire-and-forget lifecycle email. Failures are logged, never returned.
    pub fn notify_task(
        &self,
        task: &Task,
        event: TaskEvent,
        assignee_email: Option<&str>,
        settings: &Settings,
    ) {
        let Some(mailer) = self.mailer.clone() else {
            return;
        };
        let Some(message) = self.task_message(task, &event, assignee_email, settings) else {
            return;
        };
        let task_id = task.id.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&message).await {
                log::error!("Failed to send {} notification for {}: {}", event.as_str(), task_id, e);
            }
        });
    }

    pub async fn deliver(&self, message: &EmailMessage) -> Result<()> {
        let mailer = self
            .mailer
            .as_ref()
            .ok_or_else(|| Error::Unavailable("Email notifications are not configured".to_string()))?;
        mailer.send(message).await
    }

    /// Send a test email to `to`, or to the project lead. Returns the recipients.
    pub async fn send_test(&self, request: TestEmail) -> Result<Vec<String>> {
        let target = request
            .to
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.recipients.project_lead.clone())
            .ok_or_else(|| Error::invalid("No recipient given and PM_EMAIL is not set"))?;
        let (default_subject, default_html) = templates::test_email();
        let message = EmailMessage::new(
            [target],
            request.subject.unwrap_or(default_subject),
            request.body.unwrap_or(default_html),
        );
        self.deliver(&message).await?;
        Ok(message.to)
    }
}
