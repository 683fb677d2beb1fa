use uuid::Uuid;

use crate::application::ports::user_repository::UserRepository;
use crate::application::services::passwords::hash_password;

pub struct UpdatePassword<'a, R: UserRepository + ?Sized> {
    pub repo: &'a R,
}

impl<'a, R: UserRepository + ?Sized> UpdatePassword<'a, R> {
    pub async fn execute(&self, user_id: Uuid, password: &str) -> anyhow::Result<bool> {
        let hash = hash_password(password)?;
        self.repo.update_password(user_id, &hash).await
    }
}
