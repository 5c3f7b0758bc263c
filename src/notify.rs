//! Up/down notifications
//!
//! The state transition handler builds a [`Notification`] and hands it to whatever
//! [`Notifier`] the runtime was configured with.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::config::NotifierConfig;
use crate::model::Target;

const COLOR_RED: u32 = 15158332;
const COLOR_GREEN: u32 = 3066993;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to deliver notification: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification endpoint rejected the message with status {0}")]
    Rejected(reqwest::StatusCode),
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, body: &str)
    -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Down,
    Up,
}

/// Subject and body of one state-change message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn down(target: &Target, at: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::Down,
            subject: "Your site is DOWN".to_string(),
            body: format!(
                "{} ({} {}) stopped responding successfully at {}.\nAn incident has been opened.",
                target.address,
                target.method.as_str().to_uppercase(),
                target.frequency,
                at.to_rfc3339()
            ),
        }
    }

    pub fn up(target: &Target, at: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::Up,
            subject: "Your site is UP again".to_string(),
            body: format!(
                "{} is responding successfully again as of {}.\nThe open incident has been resolved.",
                target.address,
                at.to_rfc3339()
            ),
        }
    }
}

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        info!(recipients = ?recipients, "{subject}: {body}");
        Ok(())
    }
}

/// POSTs `{recipients, subject, body}` as JSON to a URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, body))]
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let payload = json!({
            "recipients": recipients,
            "subject": subject,
            "body": body,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status()));
        }

        info!("sent webhook notification");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscordMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: String,
}

/// Posts notifications to a Discord webhook as a single embed
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    url: String,
    user_id: Option<String>,
}

impl DiscordNotifier {
    pub fn new(url: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            user_id,
        }
    }

    pub fn build_message(&self, recipients: &[String], subject: &str, body: &str) -> DiscordMessage {
        let color = if subject.contains("DOWN") {
            COLOR_RED
        } else {
            COLOR_GREEN
        };

        let mention = self.user_id.as_ref().map(|id| format!("<@{id}>"));
        let content = match (mention, recipients.is_empty()) {
            (Some(mention), false) => Some(format!("{mention} ({})", recipients.join(", "))),
            (Some(mention), true) => Some(mention),
            (None, _) => None,
        };

        DiscordMessage {
            content,
            embeds: vec![DiscordEmbed {
                title: subject.to_string(),
                description: body.to_string(),
                color,
                timestamp: Utc::now().to_rfc3339(),
            }],
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    #[instrument(skip(self, body))]
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let message = self.build_message(recipients, subject, body);
        let response = self.client.post(&self.url).json(&message).send().await?;

        let status = response.status();
        if !status.is_success() {
            if let Ok(error_text) = response.text().await {
                warn!("Discord API error response: {error_text}");
            }
            return Err(NotifyError::Rejected(status));
        }

        info!("sent Discord notification");
        Ok(())
    }
}

/// Build the configured notifier
pub fn from_config(config: &NotifierConfig) -> Arc<dyn Notifier> {
    match config {
        NotifierConfig::Log => Arc::new(LogNotifier),
        NotifierConfig::Webhook { url } => Arc::new(WebhookNotifier::new(url.clone())),
        NotifierConfig::Discord { url, user_id } => {
            Arc::new(DiscordNotifier::new(url.clone(), user_id.clone()))
        }
    }
}
