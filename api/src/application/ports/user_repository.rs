use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::users::{User, UserRole};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub password_hash: Option<String>,
    pub picture_bkey: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            role: row.role,
            created_at: row.created_at,
            picture_bkey: row.picture_bkey,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub password_hash: String,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Returns `None` when the email is already registered.
    async fn create_user(&self, user: &NewUser) -> anyhow::Result<Option<UserRow>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRow>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRow>>;
    /// Oldest user, used to check how the table was initialized.
    async fn first_user(&self) -> anyhow::Result<Option<UserRow>>;
    async fn list_users(&self) -> anyhow::Result<Vec<UserRow>>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool>;
    /// Stores the new picture key and hands back the one it replaced.
    async fn set_picture(&self, id: Uuid, bkey: &str) -> anyhow::Result<Option<Option<String>>>;
    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn ping(&self) -> anyhow::Result<()>;
}
