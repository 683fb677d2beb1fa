use crate::application::ports::user_repository::{UserRepository, UserRow};
use crate::application::services::passwords::verify_password;
use crate::domain::users::normalize_email;

pub struct LoginWithCreds<'a, R: UserRepository + ?Sized> {
    pub repo: &'a R,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(UserRow),
    UnknownUser,
    InvalidCredentials,
}

impl<'a, R: UserRepository + ?Sized> LoginWithCreds<'a, R> {
    pub async fn execute(&self, req: &LoginRequest) -> anyhow::Result<LoginOutcome> {
        let Some(email) = normalize_email(&req.email) else {
            return Ok(LoginOutcome::UnknownUser);
        };
        let row = match self.repo.find_by_email(&email).await? {
            Some(r) => r,
            None => return Ok(LoginOutcome::UnknownUser),
        };
        let Some(hash) = row.password_hash.as_deref() else {
            return Ok(LoginOutcome::InvalidCredentials);
        };
        if verify_password(&req.password, hash)? {
            Ok(LoginOutcome::Authenticated(UserRow {
                password_hash: None,
                ..row
            }))
        } else {
            Ok(LoginOutcome::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::user_repository::NewUser;
    use crate::application::services::passwords::hash_password;
    use crate::domain::users::UserRole;
    use crate::infrastructure::memory::MemoryUserRepository;
    use uuid::Uuid;

    async fn repo_with_member() -> MemoryUserRepository {
        let repo = MemoryUserRepository::new();
        repo.create_user(&NewUser {
            id: Uuid::new_v4(),
            email: "member@example.com".into(),
            role: UserRole::Member,
            password_hash: hash_password("s3cret").unwrap(),
        })
        .await
        .unwrap();
        repo
    }

    #[tokio::test]
    async fn distinguishes_unknown_users_from_bad_passwords() {
        let repo = repo_with_member().await;
        let uc = LoginWithCreds { repo: &repo };

        let ok = uc
            .execute(&LoginRequest {
                email: "Member@Example.com".into(),
                password: "s3cret".into(),
            })
            .await
            .unwrap();
        match ok {
            LoginOutcome::Authenticated(user) => {
                assert_eq!(user.email, "member@example.com");
                assert!(user.password_hash.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let bad = uc
            .execute(&LoginRequest {
                email: "member@example.com".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap();
        assert!(matches!(bad, LoginOutcome::InvalidCredentials));

        let unknown = uc
            .execute(&LoginRequest {
                email: "nobody@example.com".into(),
                password: "s3cret".into(),
            })
            .await
            .unwrap();
        assert!(matches!(unknown, LoginOutcome::UnknownUser));
    }
}
