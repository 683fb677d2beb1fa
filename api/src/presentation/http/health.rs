use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::bootstrap::app_context::AppContext;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResp {
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, body = HealthResp),
        (status = 503, body = HealthResp, description = "Database unreachable")
    )
)]
pub async fn health(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthResp>) {
    match ctx.user_repo().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResp {
                status: "healthy".into(),
            }),
        ),
        Err(err) => {
            tracing::warn!(error = ?err, "health_degraded");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResp {
                    status: "degraded".into(),
                }),
            )
        }
    }
}

pub fn routes(ctx: AppContext) -> Router {
    Router::new().route("/health", get(health)).with_state(ctx)
}
