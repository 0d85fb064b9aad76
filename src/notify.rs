use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::MonitorConfig;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("alert delivery failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("alert endpoint answered {0}")]
    Status(reqwest::StatusCode),
}

/// Delivery channel for alert text. Best-effort: callers log and drop errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), DeliveryError>;
}

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts alerts to a chat webhook as `{username, content}`.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        let payload = json!({
            "username": "Fleet Monitor",
            "content": text,
        });
        post(&self.client, &self.url, &payload).await
    }
}

/// Sends alerts through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, bot_token: &str, chat_id: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        post(&self.client, &self.endpoint, &payload).await
    }
}

/// Fallback when no channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        warn!(alert = %text, "no alert channel configured");
        Ok(())
    }
}

async fn post(
    client: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
) -> Result<(), DeliveryError> {
    let response = client.post(url).timeout(DELIVERY_TIMEOUT).json(payload).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DeliveryError::Status(status));
    }
    Ok(())
}

/// Telegram first, then the webhook, then the log.
pub fn from_config(config: &MonitorConfig, client: reqwest::Client) -> Arc<dyn Notifier> {
    if let Some(telegram) = &config.telegram {
        return Arc::new(TelegramNotifier::new(client, &telegram.bot_token, &telegram.chat_id));
    }
    if let Some(url) = &config.webhook_url {
        return Arc::new(WebhookNotifier::new(client, url));
    }
    Arc::new(LogNotifier)
}
