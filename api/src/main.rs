use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{info, warn};

use backend::application::ports::email_port::EmailPort;
use backend::application::services::tokens::TokenService;
use backend::bootstrap::app_context::{AppContext, AppServices};
use backend::bootstrap::config::Config;
use backend::bootstrap::telemetry;
use backend::infrastructure::db;
use backend::infrastructure::db::repositories::user_repository_sqlx::SqlxUserRepository;
use backend::infrastructure::email::ResendEmailPort;
use backend::infrastructure::memory::OutboxMailer;
use backend::infrastructure::storage::s3::S3ObjectStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init(telemetry::format_from_env(), telemetry::DEFAULT_FILTER);

    let cfg = Config::from_env()?;
    info!(
        server = %cfg.server_name,
        version = %cfg.version,
        production = cfg.is_production(),
        "Starting backend"
    );

    // Database (schema is owned by the migration runner)
    let max_pool = cfg.postgres_max_pool_size;
    let pool = db::connect_pool(&cfg.database_url, max_pool).await?;
    let status = db::migration_status(&pool).await?;
    if !status.at_head() {
        warn!(current = ?status.current(), head = ?status.head, "database schema is not at head");
    }
    let user_repo = Arc::new(SqlxUserRepository::new(pool.clone()));

    let missing_s3 = "S3_ACCESS_KEY, S3_SECRET_KEY, S3_REGION and S3_ENDPOINT_URL must be set";
    let s3_cfg = cfg.s3.as_ref().context(missing_s3)?;
    let object_store = Arc::new(S3ObjectStore::new(s3_cfg).await?);

    let mailer: Arc<dyn EmailPort> = match cfg.resend_key.as_deref() {
        Some(key) => {
            let port = ResendEmailPort::new(key, &cfg.email_from)?;
            if cfg.resend_verify_api_key {
                port.verify_key().await?;
            }
            Arc::new(port)
        }
        None => {
            warn!("RESEND_KEY not set, emails are logged instead of delivered");
            Arc::new(OutboxMailer::new())
        }
    };

    let tokens = TokenService::new(&cfg.jwt_secret);
    let services = AppServices::new(user_repo, object_store, mailer, tokens);
    let ctx = AppContext::new(cfg.clone(), services);
    let app = backend::presentation::http::build_router(ctx);

    let api_addr = SocketAddr::from(([0, 0, 0, 0], cfg.api_port));
    info!(%api_addr, "HTTP API listening");
    let listener = tokio::net::TcpListener::bind(api_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("HTTP API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to listen for ctrl-c");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
