use crate::application::ports::object_store_port::ObjectStorePort;
use crate::application::ports::user_repository::UserRepository;
use crate::domain::users::User;

pub struct ListUsers<'a, R, S>
where
    R: UserRepository + ?Sized,
    S: ObjectStorePort + ?Sized,
{
    pub repo: &'a R,
    pub storage: &'a S,
}

#[derive(Debug, Clone)]
pub struct UserListing {
    pub user: User,
    pub picture_url: Option<String>,
}

impl<'a, R, S> ListUsers<'a, R, S>
where
    R: UserRepository + ?Sized,
    S: ObjectStorePort + ?Sized,
{
    pub async fn execute(&self) -> anyhow::Result<Vec<UserListing>> {
        let users = self.repo.list_users().await?;
        let mut out = Vec::with_capacity(users.len());
        for user in users {
            let picture_url = match user.picture_bkey.as_deref() {
                Some(key) => match self.storage.public_url(key).await {
                    Ok(url) => url,
                    Err(err) => {
                        tracing::warn!(user_id = %user.id, key = %key, error = ?err, "picture_url_failed");
                        None
                    }
                },
                None => None,
            };
            out.push(UserListing {
                user: user.into(),
                picture_url,
            });
        }
        Ok(out)
    }
}
