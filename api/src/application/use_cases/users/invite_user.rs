use uuid::Uuid;

use crate::application::ports::email_port::EmailPort;
use crate::application::ports::user_repository::{NewUser, UserRepository, UserRow};
use crate::application::services::mail;
use crate::application::services::passwords::{hash_password, random_token};
use crate::application::services::tokens::TokenService;
use crate::domain::users::UserRole;

pub struct InviteUser<'a, R, E>
where
    R: UserRepository + ?Sized,
    E: EmailPort + ?Sized,
{
    pub repo: &'a R,
    pub mailer: &'a E,
    pub tokens: &'a TokenService,
    /// Absolute URL of the code login route, without query string.
    pub login_code_url: String,
    pub magic_link_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct InviteRequest {
    pub email: String,
    pub role: UserRole,
    pub password: Option<String>,
    pub send_magic_link: bool,
}

#[derive(Debug)]
pub enum InviteOutcome {
    Created(UserRow),
    EmailTaken,
    DeliveryFailed,
}

impl<'a, R, E> InviteUser<'a, R, E>
where
    R: UserRepository + ?Sized,
    E: EmailPort + ?Sized,
{
    pub async fn execute(&self, req: &InviteRequest) -> anyhow::Result<InviteOutcome> {
        if self.repo.find_by_email(&req.email).await?.is_some() {
            return Ok(InviteOutcome::EmailTaken);
        }
        // fixed up front so the emailed code names the user about to be created
        let id = Uuid::new_v4();

        if req.send_magic_link {
            let code = self.tokens.issue_code(id, self.magic_link_minutes)?;
            let link = format!("{}?code={}", self.login_code_url, code);
            let message = mail::magic_link(&req.email, &link, self.magic_link_minutes);
            if let Err(err) = self.mailer.send(&message).await {
                tracing::warn!(email = %req.email, error = ?err, "magic_link_delivery_failed");
                return Ok(InviteOutcome::DeliveryFailed);
            }
        }

        let password = match req.password.as_deref() {
            Some(p) => p.to_string(),
            None => random_token(16),
        };
        let created = self
            .repo
            .create_user(&NewUser {
                id,
                email: req.email.clone(),
                role: req.role,
                password_hash: hash_password(&password)?,
            })
            .await?;
        Ok(match created {
            Some(user) => {
                tracing::info!(user_id = %user.id, role = %user.role, "user_invited");
                InviteOutcome::Created(user)
            }
            None => InviteOutcome::EmailTaken,
        })
    }
}
