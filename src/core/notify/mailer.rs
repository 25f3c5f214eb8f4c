use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::graph::GraphClient;

/// One outgoing HTML email.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

impl EmailMessage {
    /// Recipients are trimmed, de-duplicated case-insensitively and blanks dropped.
    pub fn new(
        to: impl IntoIterator<Item = String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        let mut recipients: Vec<String> = Vec::new();
        for address in to {
            let address = address.trim();
            if address.is_empty() {
                continue;
            }
            if recipients.iter().any(|r| r.eq_ignore_ascii_case(address)) {
                continue;
            }
            recipients.push(address.to_string());
        }
        Self {
            to: recipients,
            subject: subject.into(),
            html: html.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to.is_empty()
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Sends through the Graph `sendMail` endpoint of a fixed sender mailbox.
pub struct GraphMailer {
    client: Arc<GraphClient>,
    sender: String,
}

impl GraphMailer {
    pub fn new(client: Arc<GraphClient>, sender: impl Into<String>) -> Self {
        Self {
            client,
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Mailer for GraphMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if message.is_empty() {
            return Ok(());
        }
        self.client
            .send_mail(&self.sender, &message.to, &message.subject, &message.html)
            .await
    }
}
