use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::ports::email_port::{EmailMessage, EmailPort};

const OUTBOX_LIMIT: usize = 100;

/// Keeps the latest messages instead of delivering them and logs each one.
#[derive(Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `send` fail, as an unreachable provider would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailPort for OutboxMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("outbox mailer configured to fail");
        }
        tracing::info!(to = ?message.to, subject = %message.subject, "email_captured");
        tracing::debug!(html = %message.html, "email_captured_body");
        let mut sent = self.sent.lock().await;
        if sent.len() == OUTBOX_LIMIT {
            sent.remove(0);
        }
        sent.push(message.clone());
        Ok(())
    }
}
