use crate::application::ports::user_repository::{UserRepository, UserRow};
use crate::application::services::tokens::{TokenError, TokenService};

pub struct LoginWithCode<'a, R: UserRepository + ?Sized> {
    pub repo: &'a R,
    pub tokens: &'a TokenService,
}

#[derive(Debug)]
pub enum CodeLoginOutcome {
    Authenticated(UserRow),
    InvalidCode(TokenError),
    UnknownUser,
}

impl<'a, R: UserRepository + ?Sized> LoginWithCode<'a, R> {
    pub async fn execute(&self, code: &str) -> anyhow::Result<CodeLoginOutcome> {
        let claims = match self.tokens.decode_code(code) {
            Ok(c) => c,
            Err(e) => return Ok(CodeLoginOutcome::InvalidCode(e)),
        };
        Ok(match self.repo.find_by_id(claims.sub).await? {
            Some(user) => CodeLoginOutcome::Authenticated(user),
            None => CodeLoginOutcome::UnknownUser,
        })
    }
}
