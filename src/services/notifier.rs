use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::Operation;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Webhook rejected notification: {status} - {message}")]
    Rejected { status: StatusCode, message: String },
}

#[derive(Debug, Serialize)]
struct WebhookMessage {
    content: String,
}

/// Posts chat-style messages to an incoming webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Secret<String>,
}

impl WebhookNotifier {
    pub fn new(url: Secret<String>) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, url })
    }

    /// Announces that a card entered the watched offload status
    pub async fn notify_backup(&self, operation: &Operation) -> Result<(), NotifyError> {
        let message = WebhookMessage {
            content: backup_message(operation),
        };

        let response = self
            .client
            .post(self.url.expose_secret())
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(NotifyError::Rejected { status, message })
    }
}

pub fn backup_message(operation: &Operation) -> String {
    format!(
        ":warning: **Card {status}**\n• Card: `{card}`\n• By: `{user}`\n• Geo status: `{geo}`",
        status = operation.offload_status.as_deref().unwrap_or("updated"),
        card = operation.card_name,
        user = operation.username,
        geo = operation.target_geo,
    )
}
