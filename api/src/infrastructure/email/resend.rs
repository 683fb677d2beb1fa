use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::application::ports::email_port::{EmailMessage, EmailPort};

pub const RESEND_API_URL: &str = "https://api.resend.com";

pub struct ResendEmailPort {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
}

impl ResendEmailPort {
    pub fn new(api_key: &str, from: &str) -> anyhow::Result<Self> {
        Self::with_base_url(RESEND_API_URL, api_key, from)
    }

    pub fn with_base_url(base_url: &str, api_key: &str, from: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build http client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }

    /// Lists the account's domains, which fails on a revoked or mistyped key.
    pub async fn verify_key(&self) -> anyhow::Result<()> {
        let resp = self
            .client
            .get(format!("{}/domains", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("request failed: {e}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("invalid Resend API key: status {}", resp.status());
        }
        tracing::info!("resend_key_verified");
        Ok(())
    }
}

#[async_trait]
impl EmailPort for ResendEmailPort {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let body = SendEmailBody {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };
        let resp = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("request failed: {e}"))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            tracing::error!(status = %status, detail = %detail, "email_send_failed");
            anyhow::bail!("email provider returned status {status}");
        }
        tracing::info!(to = ?message.to, subject = %message.subject, "email_sent");
        Ok(())
    }
}
