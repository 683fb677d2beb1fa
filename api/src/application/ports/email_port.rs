use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailPort: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}
