//! HS256 tokens: long-lived access tokens carrying the user's role as `scope`,
//! and short-lived magic-link codes that carry no scope at all.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::users::UserRole;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub scope: UserRole,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeClaims {
    pub sub: Uuid,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("invalid token")]
    Malformed,
    #[error("invalid token payload")]
    InvalidPayload,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue_access(
        &self,
        user_id: Uuid,
        role: UserRole,
        expires_minutes: i64,
    ) -> Result<String, TokenError> {
        self.encode(&AccessClaims {
            sub: user_id,
            scope: role,
            exp: expiry(expires_minutes),
        })
    }

    pub fn issue_code(&self, user_id: Uuid, expires_minutes: i64) -> Result<String, TokenError> {
        self.encode(&CodeClaims {
            sub: user_id,
            exp: expiry(expires_minutes),
        })
    }

    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let raw = self.decode_raw(token)?;
        serde_json::from_value(raw).map_err(|_| TokenError::InvalidPayload)
    }

    pub fn decode_code(&self, token: &str) -> Result<CodeClaims, TokenError> {
        let raw = self.decode_raw(token)?;
        serde_json::from_value(raw).map_err(|_| TokenError::InvalidPayload)
    }

    fn encode<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn decode_raw(&self, token: &str) -> Result<serde_json::Value, TokenError> {
        jsonwebtoken::decode::<serde_json::Value>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature | ErrorKind::InvalidSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })
    }
}

fn expiry(minutes: i64) -> i64 {
    (chrono::Utc::now() + chrono::Duration::minutes(minutes)).timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_carries_subject_and_scope() {
        let svc = TokenService::new("unit-test-secret");
        let id = Uuid::new_v4();
        let token = svc.issue_access(id, UserRole::Superadmin, 60).unwrap();
        let claims = svc.decode_access(&token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.scope, UserRole::Superadmin);
    }

    #[test]
    fn expired_and_foreign_tokens_are_reported_as_expired() {
        let svc = TokenService::new("unit-test-secret");
        let old = svc
            .issue_access(Uuid::new_v4(), UserRole::Member, -10)
            .unwrap();
        assert_eq!(svc.decode_access(&old), Err(TokenError::Expired));

        let other = TokenService::new("another-secret");
        let foreign = other
            .issue_access(Uuid::new_v4(), UserRole::Member, 10)
            .unwrap();
        assert_eq!(svc.decode_access(&foreign), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        let svc = TokenService::new("unit-test-secret");
        assert_eq!(svc.decode_access("not.a.jwt"), Err(TokenError::Malformed));
    }

    #[test]
    fn codes_cannot_be_used_as_access_tokens() {
        let svc = TokenService::new("unit-test-secret");
        let id = Uuid::new_v4();
        let code = svc.issue_code(id, 5).unwrap();
        assert_eq!(svc.decode_access(&code), Err(TokenError::InvalidPayload));
        assert_eq!(svc.decode_code(&code).unwrap().sub, id);
    }
}
