use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::application::ports::user_repository::{NewUser, UserRepository, UserRow};

#[derive(Default)]
pub struct MemoryUserRepository {
    rows: Mutex<Vec<UserRow>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create_user(&self, user: &NewUser) -> anyhow::Result<Option<UserRow>> {
        let mut rows = self.rows.lock().await;
        let taken = |r: &UserRow| r.email == user.email || r.id == user.id;
        if rows.iter().any(taken) {
            return Ok(None);
        }
        let row = UserRow {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            password_hash: Some(user.password_hash.clone()),
            picture_bkey: None,
            created_at: chrono::Utc::now(),
        };
        rows.push(row.clone());
        Ok(Some(row))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRow>> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|r| r.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRow>> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|r| r.id == id).cloned())
    }

    async fn first_user(&self) -> anyhow::Result<Option<UserRow>> {
        Ok(self.rows.lock().await.first().cloned())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<UserRow>> {
        Ok(self.rows.lock().await.clone())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().await;
        match rows.iter_mut().find(|r| r.id == id) {
            Some(row) => {
                row.password_hash = Some(password_hash.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_picture(&self, id: Uuid, bkey: &str) -> anyhow::Result<Option<Option<String>>> {
        let mut rows = self.rows.lock().await;
        Ok(rows
            .iter_mut()
            .find(|r| r.id == id)
            .map(|row| row.picture_bkey.replace(bkey.to_string())))
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() < before)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
