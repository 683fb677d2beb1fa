use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;

use crate::application::services::tokens::AccessClaims;
use crate::bootstrap::app_context::AppContext;
use crate::domain::users::UserRole;
use crate::presentation::http::error::ApiError;

pub const ANY_ROLE: &[UserRole] = &[UserRole::Superadmin, UserRole::Member];
pub const SUPERADMIN_ONLY: &[UserRole] = &[UserRole::Superadmin];

/// Raw token from `Authorization: Bearer <token>`.
pub struct Bearer(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|auth| {
                let (scheme, token) = auth.split_once(' ')?;
                let is_bearer = scheme.eq_ignore_ascii_case("bearer");
                is_bearer.then_some(token.trim())
            })
            .filter(|t| !t.is_empty());
        let Some(token) = token else {
            let err = ApiError::new(StatusCode::UNAUTHORIZED, "Not authenticated");
            return Err(err.with_challenge("Bearer"));
        };
        Ok(Bearer(token.to_string()))
    }
}

fn challenge(allowed: &[UserRole]) -> String {
    let scopes: Vec<&str> = allowed.iter().map(UserRole::as_str).collect();
    format!("Bearer scope=\"{}\"", scopes.join(" "))
}

/// Decodes the bearer token and checks its scope against the route's roles.
pub fn authorize(
    ctx: &AppContext,
    bearer: Bearer,
    allowed: &[UserRole],
) -> Result<AccessClaims, ApiError> {
    let claims = ctx
        .tokens()
        .decode_access(&bearer.0)
        .map_err(|e| ApiError::from_token(e).with_challenge(challenge(allowed)))?;
    if !allowed.contains(&claims.scope) {
        let err = ApiError::new(StatusCode::FORBIDDEN, "Incompatible token scope.");
        return Err(err.with_challenge(challenge(allowed)));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_lists_allowed_scopes() {
        assert_eq!(challenge(ANY_ROLE), "Bearer scope=\"superadmin member\"");
        assert_eq!(challenge(SUPERADMIN_ONLY), "Bearer scope=\"superadmin\"");
    }
}
