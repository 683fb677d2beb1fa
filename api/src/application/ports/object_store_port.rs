use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub size: i64,
    pub content_hash: String,
}

#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    async fn upload(&self, bytes: &[u8], content_type: &str) -> anyhow::Result<StoredObject>;
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;
    /// Temporary download URL, `None` when the object is gone.
    async fn public_url(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}
