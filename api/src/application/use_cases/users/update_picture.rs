use uuid::Uuid;

use crate::application::ports::object_store_port::ObjectStorePort;
use crate::application::ports::user_repository::UserRepository;
use crate::infrastructure::storage::ALLOWED_PICTURE_TYPES;

pub struct UpdatePicture<'a, R, S>
where
    R: UserRepository + ?Sized,
    S: ObjectStorePort + ?Sized,
{
    pub repo: &'a R,
    pub storage: &'a S,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PictureOutcome {
    Updated { key: String },
    UnsupportedType,
    UnknownUser,
}

impl<'a, R, S> UpdatePicture<'a, R, S>
where
    R: UserRepository + ?Sized,
    S: ObjectStorePort + ?Sized,
{
    pub async fn execute(
        &self,
        user_id: Uuid,
        bytes: &[u8],
        content_type: &str,
    ) -> anyhow::Result<PictureOutcome> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !ALLOWED_PICTURE_TYPES.contains(&essence.as_str()) {
            return Ok(PictureOutcome::UnsupportedType);
        }
        let stored = self.storage.upload(bytes, &essence).await?;
        match self.repo.set_picture(user_id, &stored.key).await? {
            None => {
                let _ = self.storage.delete(&stored.key).await;
                Ok(PictureOutcome::UnknownUser)
            }
            Some(previous) => {
                if let Some(old) = previous.filter(|old| *old != stored.key)
                    && let Err(err) = self.storage.delete(&old).await
                {
                    tracing::warn!(user_id = %user_id, key = %old, error = ?err, "failed to remove replaced picture");
                }
                tracing::info!(user_id = %user_id, key = %stored.key, "picture_updated");
                Ok(PictureOutcome::Updated { key: stored.key })
            }
        }
    }
}
