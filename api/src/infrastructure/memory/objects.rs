use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::ports::object_store_port::{ObjectStorePort, StoredObject};
use crate::infrastructure::storage::{object_key, sha256_hex};

#[derive(Debug, Clone)]
struct MemoryObject {
    bytes: Vec<u8>,
    content_type: String,
}

impl MemoryObject {
    fn size(&self) -> usize {
        self.bytes.len()
    }
}

pub struct MemoryObjectStore {
    base_url: String,
    objects: Mutex<HashMap<String, MemoryObject>>,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    /// Content type and size of a stored object.
    pub async fn describe(&self, key: &str) -> Option<(String, usize)> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|o| (o.content_type.clone(), o.size()))
    }
}

#[async_trait]
impl ObjectStorePort for MemoryObjectStore {
    async fn upload(&self, bytes: &[u8], content_type: &str) -> anyhow::Result<StoredObject> {
        let content_hash = sha256_hex(bytes);
        let mut key = object_key(chrono::Utc::now(), &content_hash, content_type);
        let mut objects = self.objects.lock().await;
        // Same content within the same second collides; keep both.
        let mut counter = 1;
        while objects.contains_key(&key) {
            let base = object_key(chrono::Utc::now(), &content_hash, "");
            key = format!("{base}-{counter}");
            counter += 1;
        }
        objects.insert(
            key.clone(),
            MemoryObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(StoredObject {
            key,
            size: bytes.len() as i64,
            content_hash,
        })
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.objects.lock().await.contains_key(key))
    }

    async fn public_url(&self, key: &str) -> anyhow::Result<Option<String>> {
        let objects = self.objects.lock().await;
        Ok(objects
            .get(key)
            .map(|_| format!("{}/{}", self.base_url, key)))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }
}
