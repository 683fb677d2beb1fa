use std::env;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

#[derive(Clone, Debug)]
pub struct Config {
    pub project_name: String,
    pub project_description: String,
    pub version: String,
    pub api_v1_str: String,
    pub api_port: u16,
    pub cors_origins: Vec<String>,
    pub support_email: String,
    pub superadmin_email: String,
    pub superadmin_password: String,
    pub resend_key: Option<String>,
    pub email_from: String,
    pub backend_host: String,
    pub resend_verify_api_key: bool,
    pub database_url: String,
    pub postgres_max_pool_size: u32,
    pub jwt_secret: String,
    pub jwt_expire_minutes: i64,
    pub jwt_unlimited_minutes: i64,
    pub magic_link_minutes: i64,
    pub s3: Option<S3Config>,
    pub server_name: String,
    pub debug: bool,
    pub upload_max_bytes: usize,
    pub rate_limit: Option<RateLimitConfig>,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct S3Config {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub endpoint_url: String,
    pub bucket_name: String,
    pub proxy_url: Option<String>,
    pub url_expiration_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained requests allowed per `period_secs`.
    pub average: u32,
    pub burst: u32,
    pub period_secs: u64,
    pub ipv4_prefix: u8,
    pub ipv6_prefix: u8,
    pub trust_forwarded: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            average: 100,
            burst: 200,
            period_secs: 1,
            ipv4_prefix: 32,
            ipv6_prefix: 64,
            trust_forwarded: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parse_or = |key: &str, default: u64| -> anyhow::Result<u64> {
            match get(key) {
                Some(v) => v
                    .parse()
                    .map_err(|_| anyhow::anyhow!("{key} must be an unsigned integer, got {v:?}")),
                None => Ok(default),
            }
        };
        let flag = |key: &str, default: bool| {
            get(key)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(default)
        };

        let project_name = get("PROJECT_NAME").unwrap_or_else(|| "Fastemplate API".into());
        let project_description = get("PROJECT_DESCRIPTION")
            .unwrap_or_else(|| "Template backend API for Rust web services".into());
        let api_v1_str = get("API_V1_STR").unwrap_or_else(|| "/api/v1".into());
        let api_v1_str = format!("/{}", api_v1_str.trim_matches('/'));
        let api_port = parse_or("API_PORT", 5050)? as u16;
        let cors_origins = get("CORS_ORIGIN")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        let support_email = get("SUPPORT_EMAIL").unwrap_or_else(|| "support@email.com".into());

        let Some(superadmin_email) = get("SUPERADMIN_EMAIL") else {
            anyhow::bail!("SUPERADMIN_EMAIL must be set");
        };
        let Some(superadmin_password) = get("SUPERADMIN_PWD") else {
            anyhow::bail!("SUPERADMIN_PWD must be set");
        };

        let resend_key = get("RESEND_KEY");
        let email_from = get("EMAIL_FROM").unwrap_or_else(|| "no-reply@localhost".into());
        let backend_host = get("BACKEND_HOST")
            .unwrap_or_else(|| format!("http://localhost:{api_port}"))
            .trim_end_matches('/')
            .to_string();
        let resend_verify_api_key = flag("RESEND_VERIFY_API_KEY", true);

        let Some(database_url) = get("POSTGRES_URL").or_else(|| get("DATABASE_URL")) else {
            anyhow::bail!("POSTGRES_URL (or DATABASE_URL) must be set");
        };
        if !(database_url.starts_with("postgres://") || database_url.starts_with("postgresql://")) {
            anyhow::bail!("POSTGRES_URL must be a postgres:// URL");
        }
        let postgres_max_pool_size = parse_or("POSTGRES_MAX_POOL_SIZE", 10)? as u32;

        let jwt_secret_env = get("JWT_SECRET");
        let jwt_secret = jwt_secret_env.clone().unwrap_or_else(random_secret);
        let jwt_expire_minutes = parse_or("JWT_EXPIRE_MINUTES", 60)? as i64;
        let jwt_unlimited_minutes = parse_or("JWT_UNLIMITED_MINUTES", 60 * 24 * 365)? as i64;

        let s3 = match (
            get("S3_ACCESS_KEY"),
            get("S3_SECRET_KEY"),
            get("S3_REGION"),
            get("S3_ENDPOINT_URL"),
        ) {
            (Some(access_key), Some(secret_key), Some(region), Some(endpoint_url)) => {
                Some(S3Config {
                    access_key,
                    secret_key,
                    region,
                    endpoint_url: endpoint_url.trim_end_matches('/').to_string(),
                    bucket_name: get("S3_BUCKET_NAME").unwrap_or_else(|| "fastemplate".into()),
                    proxy_url: get("S3_PROXY_URL").map(|u| u.trim_end_matches('/').to_string()),
                    url_expiration_secs: parse_or("S3_URL_EXPIRATION", 24 * 3600)?,
                })
            }
            _ => None,
        };

        let server_name = get("SERVER_NAME")
            .or_else(|| get("HOSTNAME"))
            .unwrap_or_else(|| "localhost".into());
        // Anything but an explicit "false" keeps debug mode on.
        let debug = get("DEBUG")
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        let upload_max_bytes = parse_or("UPLOAD_MAX_BYTES", 5 * 1024 * 1024)? as usize;

        let rate_limit = if flag("RATE_LIMIT_ENABLED", false) {
            let defaults = RateLimitConfig::default();
            let cfg = RateLimitConfig {
                average: parse_or("RATE_LIMIT_AVERAGE", defaults.average.into())? as u32,
                burst: parse_or("RATE_LIMIT_BURST", defaults.burst.into())? as u32,
                period_secs: parse_or("RATE_LIMIT_PERIOD_SECS", defaults.period_secs)?,
                ipv4_prefix: parse_or("RATE_LIMIT_IPV4_PREFIX", defaults.ipv4_prefix.into())? as u8,
                ipv6_prefix: parse_or("RATE_LIMIT_IPV6_PREFIX", defaults.ipv6_prefix.into())? as u8,
                trust_forwarded: flag("RATE_LIMIT_TRUST_FORWARDED", false),
            };
            if cfg.average == 0 || cfg.burst == 0 || cfg.period_secs == 0 {
                anyhow::bail!("rate limit average, burst and period must be positive");
            }
            if cfg.ipv4_prefix > 32 || cfg.ipv6_prefix > 128 {
                anyhow::bail!("rate limit prefixes must be at most 32 (IPv4) and 128 (IPv6)");
            }
            Some(cfg)
        } else {
            None
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        // Production hardening: secrets must be explicit and mail must really be delivered
        if !debug {
            match jwt_secret_env.as_deref() {
                Some(secret) if secret.len() >= 16 => {}
                _ => anyhow::bail!("JWT_SECRET must be set to a strong secret in production"),
            }
            if resend_key.is_none() {
                anyhow::bail!("RESEND_KEY must be set in production");
            }
        }

        Ok(Self {
            project_name,
            project_description,
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_v1_str,
            api_port,
            cors_origins,
            support_email,
            superadmin_email,
            superadmin_password,
            resend_key,
            email_from,
            backend_host,
            resend_verify_api_key,
            database_url,
            postgres_max_pool_size,
            jwt_secret,
            jwt_expire_minutes,
            jwt_unlimited_minutes,
            magic_link_minutes: 5,
            s3,
            server_name,
            debug,
            upload_max_bytes,
            rate_limit,
            log_format,
        })
    }

    pub fn is_production(&self) -> bool {
        !self.debug
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
