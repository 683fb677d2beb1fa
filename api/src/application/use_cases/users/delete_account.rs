use uuid::Uuid;

use crate::application::ports::object_store_port::ObjectStorePort;
use crate::application::ports::user_repository::UserRepository;

pub struct DeleteAccount<'a, R, S>
where
    R: UserRepository + ?Sized,
    S: ObjectStorePort + ?Sized,
{
    pub repo: &'a R,
    pub storage: &'a S,
}

impl<'a, R, S> DeleteAccount<'a, R, S>
where
    R: UserRepository + ?Sized,
    S: ObjectStorePort + ?Sized,
{
    /// Returns `false` when the user no longer exists.
    pub async fn execute(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let Some(user) = self.repo.find_by_id(user_id).await? else {
            return Ok(false);
        };
        let deleted = self.repo.delete_user(user_id).await?;
        if let Some(key) = user.picture_bkey.as_deref()
            && let Err(err) = self.storage.delete(key).await
        {
            tracing::warn!(user_id = %user_id, key = %key, error = ?err, "failed to remove profile picture during account deletion");
        }
        if deleted {
            tracing::info!(user_id = %user_id, "user_deleted");
        }
        Ok(deleted)
    }
}
