use axum::{
    Form, Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::use_cases::users::delete_account::DeleteAccount;
use crate::application::use_cases::users::invite_user::{
    InviteOutcome, InviteRequest, InviteUser,
};
use crate::application::use_cases::users::list_users::ListUsers;
use crate::application::use_cases::users::update_password::UpdatePassword;
use crate::application::use_cases::users::update_picture::{PictureOutcome, UpdatePicture};
use crate::bootstrap::app_context::AppContext;
use crate::domain::users::{UserRole, normalize_email, password_length_ok};
use crate::presentation::http::auth::{ANY_ROLE, Bearer, SUPERADMIN_ONLY, authorize};
use crate::presentation::http::error::ApiError;

const PASSWORD_LENGTH_DETAIL: &str = "Password must be between 4 and 60 characters.";

#[derive(Debug, Deserialize, ToSchema)]
pub struct InviteForm {
    pub email: String,
    pub role: UserRole,
    pub password: Option<String>,
    /// Mail the user a five-minute login link.
    #[serde(default, deserialize_with = "form_bool")]
    pub send_magic_link: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordForm {
    pub password: String,
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct PictureMultipart {
    /// JPEG or PNG image
    #[schema(value_type = String, format = Binary)]
    file: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserPayload {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub picture_url: Option<String>,
}

/// HTML forms and most clients send `true`/`false`; some send `True` or `1`.
fn form_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!("invalid boolean {other:?}"))),
    }
}

pub fn routes(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/invite", post(invite_user))
        .route("/me", delete(delete_me))
        .route("/me/password", patch(update_my_password))
        .route("/me/picture", patch(update_my_picture))
        .with_state(ctx)
}

#[utoipa::path(
    post,
    path = "/api/v1/users/invite",
    tag = "users",
    security(("bearer" = [])),
    request_body(content = InviteForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 201, body = UserResponse),
        (status = 409, body = ErrorBody, description = "Email already registered"),
        (status = 502, body = ErrorBody, description = "Magic link could not be delivered")
    )
)]
pub async fn invite_user(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Form(form): Form<InviteForm>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    authorize(&ctx, bearer, SUPERADMIN_ONLY)?;
    let email = normalize_email(&form.email)
        .ok_or_else(|| ApiError::unprocessable("Invalid email address."))?;
    if let Some(password) = form.password.as_deref()
        && !password_length_ok(password)
    {
        return Err(ApiError::unprocessable(PASSWORD_LENGTH_DETAIL));
    }

    let repo = ctx.user_repo();
    let mailer = ctx.mailer();
    let uc = InviteUser {
        repo: repo.as_ref(),
        mailer: mailer.as_ref(),
        tokens: ctx.tokens(),
        login_code_url: ctx.login_code_url(),
        magic_link_minutes: ctx.cfg.magic_link_minutes,
    };
    let req = InviteRequest {
        email,
        role: form.role,
        password: form.password,
        send_magic_link: form.send_magic_link,
    };
    match uc.execute(&req).await? {
        InviteOutcome::Created(user) => Ok((
            StatusCode::CREATED,
            Json(UserResponse {
                id: user.id,
                email: user.email,
                role: user.role,
                created_at: user.created_at,
            }),
        )),
        InviteOutcome::EmailTaken => {
            Err(ApiError::new(StatusCode::CONFLICT, "Email already registered."))
        }
        InviteOutcome::DeliveryFailed => {
            Err(ApiError::new(StatusCode::BAD_GATEWAY, "Failed to send email"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    security(("bearer" = [])),
    responses((status = 200, body = [UserPayload]))
)]
pub async fn list_users(
    State(ctx): State<AppContext>,
    bearer: Bearer,
) -> Result<Json<Vec<UserPayload>>, ApiError> {
    authorize(&ctx, bearer, SUPERADMIN_ONLY)?;
    let repo = ctx.user_repo();
    let storage = ctx.object_store();
    let uc = ListUsers {
        repo: repo.as_ref(),
        storage: storage.as_ref(),
    };
    let users = uc
        .execute()
        .await?
        .into_iter()
        .map(|entry| UserPayload {
            id: entry.user.id,
            email: entry.user.email,
            role: entry.user.role,
            picture_url: entry.picture_url,
        })
        .collect();
    Ok(Json(users))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/me",
    tag = "users",
    security(("bearer" = [])),
    responses((status = 204, description = "Account deleted"), (status = 404, body = ErrorBody))
)]
pub async fn delete_me(
    State(ctx): State<AppContext>,
    bearer: Bearer,
) -> Result<StatusCode, ApiError> {
    let claims = authorize(&ctx, bearer, ANY_ROLE)?;
    let repo = ctx.user_repo();
    let storage = ctx.object_store();
    let uc = DeleteAccount {
        repo: repo.as_ref(),
        storage: storage.as_ref(),
    };
    if uc.execute(claims.sub).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("User not found."))
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/me/password",
    tag = "users",
    security(("bearer" = [])),
    request_body(content = PasswordForm, content_type = "application/x-www-form-urlencoded"),
    responses((status = 200, description = "Password updated"), (status = 422, body = ErrorBody))
)]
pub async fn update_my_password(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Form(form): Form<PasswordForm>,
) -> Result<Json<()>, ApiError> {
    let claims = authorize(&ctx, bearer, ANY_ROLE)?;
    if !password_length_ok(&form.password) {
        return Err(ApiError::unprocessable(PASSWORD_LENGTH_DETAIL));
    }
    let repo = ctx.user_repo();
    let uc = UpdatePassword {
        repo: repo.as_ref(),
    };
    if !uc.execute(claims.sub, &form.password).await? {
        return Err(ApiError::not_found("User not found."));
    }
    tracing::info!(user_id = %claims.sub, "password_updated");
    Ok(Json(()))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/me/picture",
    tag = "users",
    security(("bearer" = [])),
    request_body(content = PictureMultipart, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Picture updated"),
        (status = 400, body = ErrorBody, description = "Invalid file type")
    )
)]
pub async fn update_my_picture(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    mut multipart: Multipart,
) -> Result<Json<()>, ApiError> {
    let claims = authorize(&ctx, bearer, ANY_ROLE)?;

    let mut upload: Option<(Vec<u8>, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
        upload = Some((data.to_vec(), content_type));
    }
    let Some((bytes, content_type)) = upload else {
        return Err(ApiError::unprocessable("Missing file."));
    };

    let repo = ctx.user_repo();
    let storage = ctx.object_store();
    let uc = UpdatePicture {
        repo: repo.as_ref(),
        storage: storage.as_ref(),
    };
    match uc.execute(claims.sub, &bytes, &content_type).await? {
        PictureOutcome::Updated { .. } => Ok(Json(())),
        PictureOutcome::UnsupportedType => {
            Err(ApiError::new(StatusCode::BAD_REQUEST, "Invalid file type"))
        }
        PictureOutcome::UnknownUser => Err(ApiError::not_found("User not found.")),
    }
}
