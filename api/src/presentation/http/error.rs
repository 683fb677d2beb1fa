use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::application::services::tokens::TokenError;

/// Error body shared by every route: `{"detail": "..."}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
    pub www_authenticate: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            www_authenticate: None,
        }
    }

    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.www_authenticate = Some(challenge.into());
        self
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }

    pub fn internal(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "request_failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    pub fn from_token(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::new(StatusCode::UNAUTHORIZED, "Token has expired."),
            TokenError::Malformed => Self::new(StatusCode::NOT_ACCEPTABLE, "Invalid token."),
            TokenError::InvalidPayload => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "Invalid token payload.")
            }
            TokenError::Signing(msg) => Self::internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.detail;
        let mut response = (self.status, Json(ErrorBody { detail })).into_response();
        if let Some(challenge) = self.www_authenticate
            && let Ok(value) = HeaderValue::from_str(&challenge)
        {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_map_to_distinct_statuses() {
        assert_eq!(
            ApiError::from_token(TokenError::Expired).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from_token(TokenError::Malformed).status,
            StatusCode::NOT_ACCEPTABLE
        );
        let payload = ApiError::from_token(TokenError::InvalidPayload);
        assert_eq!(payload.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(payload.detail, "Invalid token payload.");
    }

    #[test]
    fn challenge_is_sent_as_header() {
        let response = ApiError::new(StatusCode::UNAUTHORIZED, "Not authenticated")
            .with_challenge("Bearer")
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }
}
