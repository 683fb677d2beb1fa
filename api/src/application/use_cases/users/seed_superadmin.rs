use uuid::Uuid;

use crate::application::ports::user_repository::{NewUser, UserRepository};
use crate::application::services::passwords::hash_password;
use crate::domain::users::{UserRole, normalize_email};

pub struct SeedSuperadmin<'a, R: UserRepository + ?Sized> {
    pub repo: &'a R,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SeedOutcome {
    Created(Uuid),
    Recovered,
}

impl<'a, R: UserRepository + ?Sized> SeedSuperadmin<'a, R> {
    pub async fn execute(&self, email: &str, password: &str) -> anyhow::Result<SeedOutcome> {
        let email = normalize_email(email)
            .ok_or_else(|| anyhow::anyhow!("SUPERADMIN_EMAIL is not a valid email address"))?;
        match self.repo.first_user().await? {
            None => {
                tracing::info!("creating superadmin user");
                let id = Uuid::new_v4();
                let created = self
                    .repo
                    .create_user(&NewUser {
                        id,
                        email,
                        role: UserRole::Superadmin,
                        password_hash: hash_password(password)?,
                    })
                    .await?;
                anyhow::ensure!(created.is_some(), "superadmin email already registered");
                Ok(SeedOutcome::Created(id))
            }
            Some(first) if first.email != email => {
                tracing::error!(found = %first.email, "incorrect initialization of user table");
                anyhow::bail!("database was initialized with a different superadmin email")
            }
            Some(_) => {
                tracing::info!("recovering existing user table");
                Ok(SeedOutcome::Recovered)
            }
        }
    }
}
