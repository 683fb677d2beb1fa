pub mod auth;
pub mod error;
pub mod health;
pub mod login;
pub mod rate_limit;
pub mod users;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{DefaultBodyLimit, MatchedPath, Request};
use axum::http::{HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::{ContactBuilder, OpenApi as OpenApiDoc};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::bootstrap::app_context::AppContext;
use crate::bootstrap::config::Config;
use rate_limit::RateLimiter;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login_with_creds,
        login::login_with_code,
        login::validate,
        users::invite_user,
        users::list_users,
        users::delete_me,
        users::update_my_password,
        users::update_my_picture,
    ),
    components(schemas(
        error::ErrorBody,
        health::HealthResp,
        login::CredsForm,
        login::TokenResponse,
        users::InviteForm,
        users::PasswordForm,
        users::PictureMultipart,
        users::UserResponse,
        users::UserPayload,
        crate::domain::users::UserRole,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "login", description = "Access tokens"),
        (name = "users", description = "User management"),
        (name = "health", description = "System health checks")
    )
)]
pub struct ApiDoc;

/// Prefix the `#[utoipa::path]` annotations are written against.
const DOCUMENTED_PREFIX: &str = "/api/v1";

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut OpenApiDoc) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// OpenAPI document with the deployment's title, version and contact.
pub fn openapi(cfg: &Config) -> OpenApiDoc {
    let mut doc = ApiDoc::openapi();
    doc.info.title = cfg.project_name.clone();
    doc.info.version = cfg.version.clone();
    doc.info.description = Some(cfg.project_description.clone());
    doc.info.contact = Some(
        ContactBuilder::new()
            .name(Some("API support"))
            .email(Some(cfg.support_email.clone()))
            .build(),
    );
    if cfg.api_v1_str != DOCUMENTED_PREFIX {
        let paths = std::mem::take(&mut doc.paths.paths);
        doc.paths.paths = paths
            .into_iter()
            .map(|(path, item)| (mounted_path(&path, &cfg.api_v1_str), item))
            .collect();
    }
    doc
}

fn mounted_path(path: &str, api: &str) -> String {
    match path.strip_prefix(DOCUMENTED_PREFIX) {
        Some(rest) => format!("{api}{rest}"),
        None => path.to_string(),
    }
}

fn cors(cfg: &Config) -> CorsLayer {
    if cfg.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = cfg
        .cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Adds `X-Process-Time` (seconds) to every response.
async fn process_time(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed().as_secs_f64();
    if let Ok(value) = HeaderValue::from_str(&elapsed.to_string()) {
        response.headers_mut().insert("x-process-time", value);
    }
    response
}

pub fn build_router(ctx: AppContext) -> Router {
    let api = ctx.cfg.api_v1_str.clone();
    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request| {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let matched = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default();
        tracing::info_span!("http", %method, %uri, matched_path = %matched)
    });
    let router = Router::new()
        .merge(health::routes(ctx.clone()))
        .nest(&format!("{api}/login"), login::routes(ctx.clone()))
        .nest(&format!("{api}/users"), users::routes(ctx.clone()))
        .merge(SwaggerUi::new("/docs").url(format!("{api}/openapi.json"), openapi(&ctx.cfg)))
        .layer(DefaultBodyLimit::max(ctx.cfg.upload_max_bytes))
        .layer(cors(&ctx.cfg))
        .layer(middleware::from_fn(process_time))
        .layer(trace);

    match ctx.cfg.rate_limit.clone() {
        Some(limits) => {
            tracing::info!(average = limits.average, burst = limits.burst, "rate_limit_enabled");
            let limiter = Arc::new(RateLimiter::new(limits));
            router.layer(middleware::from_fn_with_state(limiter, rate_limit::rate_limit))
        }
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_paths_move_under_the_mounted_prefix() {
        assert_eq!(mounted_path("/api/v1/users/me", "/v2"), "/v2/users/me");
        assert_eq!(mounted_path("/health", "/v2"), "/health");
    }
}
