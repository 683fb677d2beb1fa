use tracing_subscriber::EnvFilter;

use crate::bootstrap::config::LogFormat;

pub const DEFAULT_FILTER: &str = "backend=debug,tower_http=info,axum=info";

/// Installs the global subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init(format: LogFormat, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    if let Err(err) = result {
        eprintln!("tracing subscriber already installed: {err}");
    }
}

/// Format requested through `LOG_FORMAT`, for binaries that start logging
/// before the full configuration is loaded.
pub fn format_from_env() -> LogFormat {
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}
