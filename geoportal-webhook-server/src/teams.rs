//! Microsoft Teams incoming-webhook notifier.

use anyhow::Context;
use async_trait::async_trait;
use geoportal_webhook_core::notify::Notifier;
use geoportal_webhook_core::types::Notification;
use geoportal_webhook_core::{Error, Result};
use reqwest::Client;

pub struct TeamsNotifier {
    http: Client,
    url: String,
}

impl TeamsNotifier {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| Error::NotificationDelivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::NotificationDelivery(format!(
                "Teams returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        tracing::debug!(title = %notification.title, "notification delivered");
        Ok(())
    }
}
