use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;

use crate::interceptor::{Alert, Severity};

/// Posts critical API alerts to a chat webhook.
#[derive(Clone)]
pub struct AlertNotifier {
    webhook_url: Option<String>,
    http: Client,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: String,
    code: &'a str,
}

impl AlertNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self { webhook_url, http: Client::new() }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn should_forward(alert: &Alert) -> bool {
        alert.severity >= Severity::Critical
    }

    pub async fn notify(&self, alert: &Alert) -> Result<()> {
        let Some(url) = self.webhook_url.as_deref() else {
            return Ok(());
        };
        if !Self::should_forward(alert) {
            return Ok(());
        }

        let resp = self
            .http
            .post(url)
            .json(&WebhookPayload {
                text: format!("[calnotes] {}", alert.message),
                code: alert.code.as_str(),
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow!("alert webhook failed: {}", resp.status()));
        }

        Ok(())
    }
}
