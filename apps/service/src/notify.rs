//! DOWN alert delivery.
//!
//! The scheduler calls a [`Notifier`] once per transition into DOWN, after the
//! transition record has been written.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use crate::database::models::{EndpointKey, MonitoredEndpoint};
use crate::error::NotifyError;
use crate::monitoring::types::MonitorStatus;

/// Content of one DOWN alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownAlert {
    pub owner: String,
    pub name: String,
    pub url: String,
    pub status: MonitorStatus,
    pub timestamp: DateTime<Utc>,
}

impl DownAlert {
    pub fn new(endpoint: &MonitoredEndpoint, timestamp: DateTime<Utc>) -> Self {
        Self {
            owner: endpoint.owner.clone(),
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            status: MonitorStatus::Down,
            timestamp,
        }
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.owner.clone(), self.name.clone())
    }

    pub fn subject(&self) -> String {
        format!("Website DOWN Alert: {}", self.name)
    }

    /// Human-readable alert body
    pub fn message(&self) -> String {
        format!(
            "Website Name : {}\nURL          : {}\nStatus       : {}\nTime         : {}\n",
            self.name,
            self.url,
            self.status,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

/// Alert delivery channel
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_down(&self, alert: &DownAlert) -> Result<(), NotifyError>;

    fn name(&self) -> &str;
}

/// Writes alerts to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify_down(&self, alert: &DownAlert) -> Result<(), NotifyError> {
        tracing::warn!(
            target: "sitewatch::alert",
            endpoint = %alert.key(),
            url = %alert.url,
            at = %alert.timestamp,
            "{}",
            alert.subject()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Posts alerts as JSON to a webhook (Slack-compatible `text` field included)
#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout_seconds: u64) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self { client, webhook_url: webhook_url.into() })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_down(&self, alert: &DownAlert) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "text": format!("{}\n{}", alert.subject(), alert.message()),
            "owner": alert.owner,
            "name": alert.name,
            "url": alert.url,
            "status": alert.status,
            "timestamp": alert.timestamp,
        });

        let response = self.client.post(&self.webhook_url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// SMTP relay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub server: String,
    /// 465 for implicit TLS, usually 587 with `starttls`
    pub port: u16,
    pub starttls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: "smtp.gmail.com".into(),
            port: 465,
            starttls: false,
            username: None,
            password: None,
            from: String::new(),
            to: Vec::new(),
            timeout_seconds: 10,
        }
    }
}

/// Sends alerts as plain-text email over an encrypted SMTP connection
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        let from: Mailbox = settings.from.parse()?;
        let to = settings
            .to
            .iter()
            .map(|address| address.parse::<Mailbox>())
            .collect::<Result<Vec<_>, _>>()?;

        let builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)?
        };
        let mut builder = builder
            .port(settings.port)
            .timeout(Some(Duration::from_secs(settings.timeout_seconds)));

        if let Some(username) = &settings.username {
            let password = settings.password.clone().unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        Ok(Self { transport: builder.build(), from, to })
    }

    pub fn build_message(&self, alert: &DownAlert) -> Result<Message, NotifyError> {
        let mut message = Message::builder()
            .from(self.from.clone())
            .subject(alert.subject())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            message = message.to(recipient.clone());
        }

        Ok(message.body(alert.message())?)
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn notify_down(&self, alert: &DownAlert) -> Result<(), NotifyError> {
        let message = self.build_message(alert)?;
        self.transport.send(message).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "email"
    }
}
