use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::application::ports::user_repository::UserRow;
use crate::application::use_cases::login::login_with_code::{CodeLoginOutcome, LoginWithCode};
use crate::application::use_cases::login::login_with_creds::{
    LoginOutcome, LoginRequest as LoginDto, LoginWithCreds,
};
use crate::bootstrap::app_context::AppContext;
use crate::presentation::http::auth::{ANY_ROLE, Bearer, authorize};
use crate::presentation::http::error::ApiError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CredsForm {
    /// Email address of the user.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CodeQuery {
    pub code: String,
}

pub fn routes(ctx: AppContext) -> Router {
    Router::new()
        .route("/creds", post(login_with_creds))
        .route("/code", get(login_with_code))
        .route("/validate", get(validate))
        .with_state(ctx)
}

fn issue(ctx: &AppContext, user: &UserRow) -> Result<Json<TokenResponse>, ApiError> {
    let access_token = ctx
        .tokens()
        .issue_access(user.id, user.role, ctx.cfg.jwt_unlimited_minutes)
        .map_err(ApiError::from_token)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/login/creds",
    tag = "login",
    request_body(content = CredsForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, body = TokenResponse),
        (status = 401, body = ErrorBody, description = "Invalid credentials"),
        (status = 404, body = ErrorBody, description = "Unknown user")
    )
)]
pub async fn login_with_creds(
    State(ctx): State<AppContext>,
    Form(form): Form<CredsForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let repo = ctx.user_repo();
    let uc = LoginWithCreds {
        repo: repo.as_ref(),
    };
    let dto = LoginDto {
        email: form.username,
        password: form.password,
    };
    match uc.execute(&dto).await? {
        LoginOutcome::Authenticated(user) => issue(&ctx, &user),
        LoginOutcome::UnknownUser => Err(ApiError::not_found("User not found.")),
        LoginOutcome::InvalidCredentials => {
            Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid credentials."))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/login/code",
    tag = "login",
    params(CodeQuery),
    responses((status = 200, body = TokenResponse), (status = 404, body = ErrorBody))
)]
pub async fn login_with_code(
    State(ctx): State<AppContext>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<TokenResponse>, ApiError> {
    let repo = ctx.user_repo();
    let uc = LoginWithCode {
        repo: repo.as_ref(),
        tokens: ctx.tokens(),
    };
    match uc.execute(&query.code).await? {
        CodeLoginOutcome::Authenticated(user) => issue(&ctx, &user),
        CodeLoginOutcome::InvalidCode(err) => Err(ApiError::from_token(err)),
        CodeLoginOutcome::UnknownUser => Err(ApiError::not_found("User not found.")),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/login/validate",
    tag = "login",
    security(("bearer" = [])),
    responses((status = 200, description = "Token is valid"), (status = 401, body = ErrorBody))
)]
pub async fn validate(State(ctx): State<AppContext>, bearer: Bearer) -> Result<Json<()>, ApiError> {
    authorize(&ctx, bearer, ANY_ROLE)?;
    Ok(Json(()))
}
